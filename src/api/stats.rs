//! 图表使用的统计数据. 每次请求都在数据库上重新计算, 记录在几千条以内时
//! 足够快; 数据量更大时需要改为增量维护.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use super::db::{logged, ClassCount, GenderCount, MajorStats, Store};
use super::err::StoreError;
use super::query::SearchFilter;

pub const DEFAULT_BINS: usize = 10;
pub const MAX_BINS: usize = 100;

/// 成绩分布中的一个区间 [low, high), 最后一个区间包含100分
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub label: String,
    pub low: f64,
    pub high: f64,
    pub count: i64,
}

/// 将 [0,100] 等分为`bins`个区间并统计人数, `bins`被限制在 [1, MAX_BINS]
pub fn histogram(scores: &[f64], bins: usize) -> Vec<HistogramBin> {
    let bins = bins.clamp(1, MAX_BINS);
    let width = 100.0 / bins as f64;
    let mut result: Vec<HistogramBin> = (0..bins)
        .map(|i| {
            let low = i as f64 * width;
            let high = (i + 1) as f64 * width;
            HistogramBin {
                label: format!("{}-{}", low as i64, high as i64),
                low,
                high,
                count: 0,
            }
        })
        .collect();

    for &score in scores {
        if let Some(bin) = result
            .iter_mut()
            .find(|bin| score >= bin.low && score < bin.high)
        {
            bin.count += 1;
        } else if score == 100.0 {
            // the half-open test misses a perfect score, fold it into the last bin
            if let Some(last) = result.last_mut() {
                last.count += 1;
            }
        }
    }
    result
}

fn grouped<'args>(
    select: &str,
    filter: &'args SearchFilter,
    tail: &str,
) -> QueryBuilder<'args, Sqlite> {
    let mut qb = QueryBuilder::new(select);
    filter.push_where(&mut qb);
    qb.push(tail);
    qb
}

impl Store {
    /// 各班级人数, 只包含有学生的班级, 按班级名称排序
    pub async fn class_counts(&self, filter: &SearchFilter) -> Result<Vec<ClassCount>, StoreError> {
        logged("class counts", async {
            let mut qb = grouped(
                "SELECT class_name, COUNT(*) AS count FROM students",
                filter,
                " GROUP BY class_name ORDER BY class_name",
            );
            let rows: Vec<ClassCount> = qb.build_query_as().fetch_all(self.pool()).await?;
            Ok::<_, StoreError>(rows)
        })
        .await
    }

    /// 各专业人数与平均/最低/最高成绩, 按平均成绩降序
    pub async fn major_stats(&self, filter: &SearchFilter) -> Result<Vec<MajorStats>, StoreError> {
        logged("major stats", async {
            let mut qb = grouped(
                r"SELECT major,
                         COUNT(*) AS student_count,
                         AVG(score) AS avg_score,
                         MIN(score) AS min_score,
                         MAX(score) AS max_score
                    FROM students",
                filter,
                " GROUP BY major ORDER BY avg_score DESC",
            );
            let rows: Vec<MajorStats> = qb.build_query_as().fetch_all(self.pool()).await?;
            Ok::<_, StoreError>(rows)
        })
        .await
    }

    /// 各性别人数
    pub async fn gender_counts(&self, filter: &SearchFilter) -> Result<Vec<GenderCount>, StoreError> {
        logged("gender counts", async {
            let mut qb = grouped(
                "SELECT gender, COUNT(*) AS count FROM students",
                filter,
                " GROUP BY gender ORDER BY gender",
            );
            let rows: Vec<GenderCount> = qb.build_query_as().fetch_all(self.pool()).await?;
            Ok::<_, StoreError>(rows)
        })
        .await
    }

    /// 成绩分布
    pub async fn score_histogram(
        &self,
        filter: &SearchFilter,
        bins: usize,
    ) -> Result<Vec<HistogramBin>, StoreError> {
        logged("score histogram", async {
            let mut qb = grouped("SELECT score FROM students", filter, "");
            let scores: Vec<f64> = qb.build_query_scalar().fetch_all(self.pool()).await?;
            Ok::<_, StoreError>(histogram(&scores, bins))
        })
        .await
    }
}
