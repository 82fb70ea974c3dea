//! 查询条件的组装: 关键字/班级/专业/成绩区间的筛选, 单字段排序与分页窗口.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use super::student::StudentRecord;

/// 列表页使用的字段
pub(crate) const RECORD_COLUMNS: &str = "student_id, name, gender, age, class_name, major, \
     enrollment_date, score, created_at, updated_at";

/// 筛选条件, 所有条件之间为 AND 关系
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SearchFilter {
    /// 姓名关键字, 区分大小写的子串匹配, 为空表示不筛选
    pub keyword: String,
    /// 班级, 精确匹配, 为空表示不筛选
    pub class_name: String,
    /// 专业, 精确匹配, 为空表示不筛选
    pub major: String,
    pub min_score: f64,
    pub max_score: f64,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            class_name: String::new(),
            major: String::new(),
            min_score: 0.0,
            max_score: 100.0,
        }
    }
}

impl SearchFilter {
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = keyword.into();
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_major(mut self, major: impl Into<String>) -> Self {
        self.major = major.into();
        self
    }

    pub fn with_score_range(mut self, min_score: f64, max_score: f64) -> Self {
        self.min_score = min_score;
        self.max_score = max_score;
        self
    }

    /// 追加 WHERE 子句, 所有值都以参数绑定
    pub(crate) fn push_where<'args>(&'args self, qb: &mut QueryBuilder<'args, Sqlite>) {
        qb.push(" WHERE score >= ");
        qb.push_bind(self.min_score);
        qb.push(" AND score <= ");
        qb.push_bind(self.max_score);
        if !self.keyword.is_empty() {
            // LIKE ignores ascii case in sqlite, instr does not
            qb.push(" AND instr(name, ");
            qb.push_bind(self.keyword.as_str());
            qb.push(") > 0");
        }
        if !self.class_name.is_empty() {
            qb.push(" AND class_name = ");
            qb.push_bind(self.class_name.as_str());
        }
        if !self.major.is_empty() {
            qb.push(" AND major = ");
            qb.push_bind(self.major.as_str());
        }
    }
}

/// 可排序的字段
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    StudentId,
    Name,
    Age,
    ClassName,
    Major,
    Score,
    EnrollmentDate,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::StudentId => "student_id",
            SortField::Name => "name",
            SortField::Age => "age",
            SortField::ClassName => "class_name",
            SortField::Major => "major",
            SortField::Score => "score",
            SortField::EnrollmentDate => "enrollment_date",
        }
    }

    /// 不在白名单内的字段一律按学号排序, 不报错
    pub fn parse_or_default(column: &str) -> Self {
        match column {
            "name" => SortField::Name,
            "age" => SortField::Age,
            "class_name" => SortField::ClassName,
            "major" => SortField::Major,
            "score" => SortField::Score,
            "enrollment_date" => SortField::EnrollmentDate,
            _ => SortField::StudentId,
        }
    }
}

/// 排序方式, 只有单一排序键
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Order {
    pub field: SortField,
    pub desc: bool,
}

impl Order {
    pub fn asc(field: SortField) -> Self {
        Self { field, desc: false }
    }

    pub fn desc(field: SortField) -> Self {
        Self { field, desc: true }
    }

    pub fn from_column(column: &str, desc: bool) -> Self {
        Self {
            field: SortField::parse_or_default(column),
            desc,
        }
    }

    fn direction(&self) -> &'static str {
        if self.desc {
            "DESC"
        } else {
            "ASC"
        }
    }
}

/// 分页窗口, offset 从0开始
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// 第`number`页(从1开始)对应的窗口
    pub fn number(number: u32, size: u32) -> Self {
        Self {
            limit: size,
            offset: number.saturating_sub(1).saturating_mul(size),
        }
    }

    /// 总页数, 没有记录时也至少为1页
    pub fn total_pages(total: i64, size: u32) -> u32 {
        if size == 0 || total <= 0 {
            return 1;
        }
        let size = i64::from(size);
        let pages = (total + size - 1) / size;
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    /// 将页码限制在 [1, total_pages]
    pub fn clamp_number(number: u32, total: i64, size: u32) -> u32 {
        number.clamp(1, Self::total_pages(total, size))
    }
}

/// 一次查询的完整参数
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SearchQuery {
    pub filter: SearchFilter,
    pub order: Order,
    pub page: Page,
}

impl SearchQuery {
    pub fn new(filter: SearchFilter, order: Order, page: Page) -> Self {
        Self {
            filter,
            order,
            page,
        }
    }

    /// 统计满足条件的总数, 与分页无关
    pub(crate) fn count_sql(&self) -> QueryBuilder<'_, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM students");
        self.filter.push_where(&mut qb);
        qb
    }

    pub(crate) fn select_sql(&self) -> QueryBuilder<'_, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM students", RECORD_COLUMNS));
        self.filter.push_where(&mut qb);
        // the column comes from the whitelist, never from caller input
        qb.push(format!(
            " ORDER BY {} {}",
            self.order.field.column(),
            self.order.direction()
        ));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(self.page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(self.page.offset));
        qb
    }
}

/// 查询结果: 当前页的记录与满足条件的总数
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub records: Vec<StudentRecord>,
    pub total: i64,
}
