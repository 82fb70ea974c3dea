use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod csv_processor;
pub mod db;
pub mod err;
pub mod generator;
pub mod query;
pub mod stats;
pub mod student;
pub mod validator;

use csv_processor::RejectedRow;
use db::{BulkOutcome, ClassCount, GenderCount, MajorStats, Store};
use err::StoreError;
use generator::{GeneratorSession, Progress};
use query::{Order, Page, SearchFilter, SearchQuery};
use stats::HistogramBin;
use student::{NewStudent, StudentPatch, StudentRecord};

/// 表格的一页
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub records: Vec<StudentRecord>,
    pub total: i64,
    /// 当前页码, 从1开始
    pub page: u32,
    pub total_pages: u32,
}

/// 图表面板所需的全部统计
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub class_counts: Vec<ClassCount>,
    pub major_stats: Vec<MajorStats>,
    pub histogram: Vec<HistogramBin>,
    pub gender_counts: Vec<GenderCount>,
}

/// csv导入结果
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub inserted: usize,
    /// 学号冲突等未能写入的行
    pub failed: usize,
    pub rejected: Vec<RejectedRow>,
}

/// 界面层调用的入口
#[derive(Clone)]
pub struct AppState {
    pub db: Store,
}

impl AppState {
    pub async fn build(db_path: &Path) -> Result<Self, StoreError> {
        let db = Store::open(db_path).await?;
        Ok(AppState { db })
    }

    pub async fn add_student(&self, form: &Value) -> Result<StudentRecord, StoreError> {
        let student = validator::parse_form(form)?;
        self.db.insert(&student).await
    }

    pub async fn edit_student(
        &self,
        student_id: &str,
        patch: &StudentPatch,
    ) -> Result<StudentRecord, StoreError> {
        self.db.update(student_id, patch).await
    }

    pub async fn remove_student(&self, student_id: &str) -> Result<(), StoreError> {
        self.db.delete(student_id).await
    }

    /// 按页码加载表格, 超出范围的页码会被限制到最后一页
    pub async fn load_page(
        &self,
        filter: &SearchFilter,
        order: Order,
        page: u32,
        page_size: u32,
    ) -> Result<PageView, StoreError> {
        let query = SearchQuery::new(filter.clone(), order, Page::number(page, page_size));
        let mut result = self.db.search(&query).await?;
        let total_pages = Page::total_pages(result.total, page_size);
        let clamped = Page::clamp_number(page, result.total, page_size);

        if clamped < page {
            let query = SearchQuery::new(filter.clone(), order, Page::number(clamped, page_size));
            result = self.db.search(&query).await?;
        }
        let page = clamped;

        Ok(PageView {
            records: result.records,
            total: result.total,
            page,
            total_pages,
        })
    }

    /// 同时计算四类统计, 与表格使用同一组筛选条件
    pub async fn dashboard(&self, filter: &SearchFilter, bins: usize) -> Result<Dashboard, StoreError> {
        let (class_counts, major_stats, histogram, gender_counts) = futures::try_join!(
            self.db.class_counts(filter),
            self.db.major_stats(filter),
            self.db.score_histogram(filter, bins),
            self.db.gender_counts(filter),
        )?;
        Ok(Dashboard {
            class_counts,
            major_stats,
            histogram,
            gender_counts,
        })
    }

    /// 数据库为空时生成示例数据, 否则什么都不做
    pub async fn populate_if_empty(
        &self,
        count: usize,
        seed: u64,
        progress: impl FnMut(Progress),
    ) -> Result<Option<BulkOutcome>, StoreError> {
        if !self.db.is_empty().await? {
            return Ok(None);
        }
        let mut session = GeneratorSession::new(seed);
        let outcome = generator::populate(&self.db, &mut session, count, progress).await?;
        Ok(Some(outcome))
    }

    /// 在后台任务中生成并写入数据, 进度通过通道返回; 任务开始后不能取消
    pub fn spawn_populate(
        &self,
        count: usize,
        seed: u64,
    ) -> (
        JoinHandle<Result<BulkOutcome, StoreError>>,
        mpsc::UnboundedReceiver<Progress>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let db = self.db.clone();
        let handle = tokio::spawn(async move {
            let mut session = GeneratorSession::resume_from(&db, seed).await?;
            generator::populate(&db, &mut session, count, |progress| {
                // the receiver may already be gone, generation still runs to completion
                let _ = tx.send(progress);
            })
            .await
        });
        (handle, rx)
    }

    /// 导出满足条件的所有记录
    pub async fn export_csv(
        &self,
        csv_path: &Path,
        filter: &SearchFilter,
        order: Order,
    ) -> Result<usize, StoreError> {
        let query = SearchQuery::new(filter.clone(), order, Page::new(u32::MAX, 0));
        let result = self.db.search(&query).await?;
        csv_processor::write_records(csv_path, &result.records)?;
        info!("exported {} students to {}", result.records.len(), csv_path.display());
        Ok(result.records.len())
    }

    /// 导入csv, 校验失败的行被跳过并返回
    pub async fn import_csv(&self, csv_path: PathBuf) -> Result<ImportSummary, StoreError> {
        let table = tokio::task::spawn_blocking(move || csv_processor::read_students(&csv_path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        let students: Vec<NewStudent> = table.students;
        let outcome = self.db.bulk_insert(&students).await?;
        Ok(ImportSummary {
            inserted: outcome.success,
            failed: outcome.failed,
            rejected: table.rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::generator::{Stage, DEFAULT_SEED};
    use crate::api::query::SortField;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    async fn build_app_state() -> (AppState, TempDir) {
        let dir = tempdir().unwrap();
        let state = AppState::build(&dir.path().join("data").join("students.db"))
            .await
            .unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn test_form_crud_flow() {
        let (state, _dir) = build_app_state().await;
        let form = json!({
            "student_id": "202402015",
            "name": "孙悦",
            "gender": "女",
            "age": 21,
            "class_name": "计算机二班",
            "enrollment_date": "2023-09-01",
            "score": 79.5
        });
        let record = state.add_student(&form).await.unwrap();
        assert_eq!(record.major, "计算机科学与技术");

        let err = state.add_student(&form).await.unwrap_err();
        assert_eq!(err.to_string(), "学号 202402015 已存在");

        let patch = StudentPatch {
            name: Some("孙小悦".to_string()),
            ..Default::default()
        };
        let updated = state.edit_student("202402015", &patch).await.unwrap();
        assert_eq!(updated.name, "孙小悦");

        state.remove_student("202402015").await.unwrap();
        assert!(state.db.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_populate_and_browse() {
        let (state, _dir) = build_app_state().await;
        let mut events = 0;
        let outcome = state
            .populate_if_empty(45, DEFAULT_SEED, |_| events += 1)
            .await
            .unwrap();
        assert_eq!(outcome, Some(BulkOutcome { success: 45, failed: 0 }));
        assert_eq!(events, 47);

        // only an empty store gets sample data
        let again = state
            .populate_if_empty(45, DEFAULT_SEED, |_| {})
            .await
            .unwrap();
        assert_eq!(again, None);

        let filter = SearchFilter::default();
        let order = Order::asc(SortField::StudentId);
        let view = state.load_page(&filter, order, 3, 20).await.unwrap();
        assert_eq!(view.total, 45);
        assert_eq!(view.total_pages, 3);
        assert_eq!(view.records.len(), 5);

        let clamped = state.load_page(&filter, order, 9, 20).await.unwrap();
        assert_eq!(clamped.page, 3);
        assert_eq!(clamped.records, view.records);

        let dashboard = state.dashboard(&filter, 10).await.unwrap();
        assert_eq!(dashboard.class_counts.len(), 5);
        assert_eq!(dashboard.class_counts.iter().map(|c| c.count).sum::<i64>(), 45);
        assert_eq!(dashboard.histogram.iter().map(|b| b.count).sum::<i64>(), 45);
        assert_eq!(dashboard.gender_counts.iter().map(|g| g.count).sum::<i64>(), 45);
        assert_eq!(dashboard.major_stats.len(), 3);
    }

    #[tokio::test]
    async fn test_spawn_populate_streams_progress() {
        let (state, _dir) = build_app_state().await;
        let (handle, mut rx) = state.spawn_populate(10, DEFAULT_SEED);

        let mut last = None;
        while let Some(progress) = rx.recv().await {
            last = Some(progress);
        }
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, BulkOutcome { success: 10, failed: 0 });
        assert_eq!(
            last.map(|p| p.stage),
            Some(Stage::Finished {
                success: 10,
                failed: 0
            })
        );

        // a second run continues the serials instead of colliding
        let (handle, _rx) = state.spawn_populate(10, DEFAULT_SEED);
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.success, 10);
        assert_eq!(state.db.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_csv_export_import() {
        let (state, dir) = build_app_state().await;
        state
            .populate_if_empty(12, DEFAULT_SEED, |_| {})
            .await
            .unwrap();

        let filter = SearchFilter::default().with_major("软件工程");
        let path = dir.path().join("software.csv");
        let exported = state
            .export_csv(&path, &filter, Order::default())
            .await
            .unwrap();
        assert!(exported > 0);

        let (other, _other_dir) = build_app_state().await;
        let summary = other.import_csv(path.clone()).await.unwrap();
        assert_eq!(summary.inserted, exported);
        assert_eq!(summary.failed, 0);
        assert!(summary.rejected.is_empty());

        let again = other.import_csv(path).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.failed, exported);
    }
}
