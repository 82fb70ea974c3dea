mod table;

use std::future::Future;
use std::path::Path;

use log::{debug, error, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use time::macros::format_description;
use time::OffsetDateTime;

pub use table::{ClassCount, ClassSerial, GenderCount, MajorStats};

use super::err::{Field, StoreError, ValidationError};
use super::query::{SearchQuery, SearchResult, RECORD_COLUMNS};
use super::student::{NewStudent, StudentPatch, StudentRecord};
use super::validator::validate_student;

const SCHEMA: &str = include_str!("db/schema.sql");

/// 批量插入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub success: usize,
    pub failed: usize,
}

/// 学生记录存储, 每个操作使用独立的事务, 返回前释放连接
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// 打开(必要时创建)数据库文件并建表
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("连接数据库失败: {}", e);
                StoreError::Storage(e)
            })?;

        let store = Store { pool };
        store.init_schema().await?;
        info!("database ready at {}", path.display());
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        logged("init schema", async {
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(SCHEMA).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 添加学生, 插入前重新校验
    pub async fn insert(&self, student: &NewStudent) -> Result<StudentRecord, StoreError> {
        validate_student(student)?;
        let major = derived_major(student)?;

        logged("insert", async {
            let mut tx = self.pool.begin().await?;
            if find(&mut tx, &student.student_id).await?.is_some() {
                return Err(StoreError::DuplicateKey(student.student_id.clone()));
            }
            insert_row(&mut tx, student, major, &timestamp()?)
                .await
                .map_err(|e| duplicate_or_fault(e, &student.student_id))?;
            let record = find(&mut tx, &student.student_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(student.student_id.clone()))?;
            tx.commit().await?;
            debug!("inserted {}", record.student_id);
            Ok::<_, StoreError>(record)
        })
        .await
    }

    /// 部分更新, 合并后的记录与插入时使用同样的校验
    pub async fn update(
        &self,
        student_id: &str,
        patch: &StudentPatch,
    ) -> Result<StudentRecord, StoreError> {
        logged("update", async {
            let mut tx = self.pool.begin().await?;
            let current = find(&mut tx, student_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(student_id.to_string()))?;
            if patch.is_empty() {
                return Err(StoreError::NoOp);
            }

            let student = patch.apply(current);
            validate_student(&student)?;
            let major = derived_major(&student)?;

            sqlx::query(
                r"UPDATE students
                    SET name = ?1, gender = ?2, age = ?3, class_name = ?4, major = ?5,
                        enrollment_date = ?6, score = ?7, updated_at = ?8
                    WHERE student_id = ?9",
            )
            .bind(student.name.as_str())
            .bind(student.gender.as_str())
            .bind(student.age)
            .bind(student.class_name.as_str())
            .bind(major)
            .bind(student.enrollment_date.as_str())
            .bind(student.score)
            .bind(timestamp()?)
            .bind(student_id)
            .execute(&mut *tx)
            .await?;

            let record = find(&mut tx, student_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(student_id.to_string()))?;
            tx.commit().await?;
            Ok::<_, StoreError>(record)
        })
        .await
    }

    pub async fn delete(&self, student_id: &str) -> Result<(), StoreError> {
        logged("delete", async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query("DELETE FROM students WHERE student_id = ?1")
                .bind(student_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(student_id.to_string()));
            }
            tx.commit().await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    pub async fn get(&self, student_id: &str) -> Result<StudentRecord, StoreError> {
        logged("get", async {
            let mut conn = self.pool.acquire().await?;
            find(&mut conn, student_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(student_id.to_string()))
        })
        .await
    }

    pub async fn exists(&self, student_id: &str) -> Result<bool, StoreError> {
        logged("exists", async {
            let mut conn = self.pool.acquire().await?;
            Ok::<_, StoreError>(find(&mut conn, student_id).await?.is_some())
        })
        .await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        logged("count", async {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, StoreError>(count)
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.count().await? == 0)
    }

    /// 按条件分页查询, 总数与分页窗口无关
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, StoreError> {
        logged("search", async {
            // count and page read the same snapshot
            let mut tx = self.pool.begin().await?;
            let mut count = query.count_sql();
            let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;
            let mut select = query.select_sql();
            let records = select
                .build_query_as::<StudentRecord>()
                .fetch_all(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, StoreError>(SearchResult { records, total })
        })
        .await
    }

    /// 所有学生, 按学号排序
    pub async fn get_all(&self) -> Result<Vec<StudentRecord>, StoreError> {
        logged("get all", async {
            let records: Vec<StudentRecord> = sqlx::query_as(&format!(
                "SELECT {} FROM students ORDER BY student_id",
                RECORD_COLUMNS
            ))
            .fetch_all(&self.pool)
            .await?;
            Ok::<_, StoreError>(records)
        })
        .await
    }

    /// 批量插入, 不重复校验; 学号冲突计为失败但不中断, 其他错误回滚整批
    pub async fn bulk_insert(&self, students: &[NewStudent]) -> Result<BulkOutcome, StoreError> {
        logged("bulk insert", async {
            let mut outcome = BulkOutcome::default();
            let now = timestamp()?;
            let mut tx = self.pool.begin().await?;

            for student in students {
                let Some(major) = student.major() else {
                    warn!("{} 的班级 {} 无效, 跳过", student.student_id, student.class_name);
                    outcome.failed += 1;
                    continue;
                };
                match insert_row(&mut tx, student, major, &now).await {
                    Ok(()) => outcome.success += 1,
                    Err(e) if is_unique_violation(&e) => {
                        debug!("学号 {} 已存在, 跳过", student.student_id);
                        outcome.failed += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            tx.commit().await?;
            info!(
                "bulk insert finished: {} inserted, {} failed",
                outcome.success, outcome.failed
            );
            Ok::<_, StoreError>(outcome)
        })
        .await
    }

    /// 每个班级代码下已使用的最大流水号
    pub async fn max_serials(&self) -> Result<Vec<ClassSerial>, StoreError> {
        logged("max serials", async {
            let rows: Vec<ClassSerial> = sqlx::query_as(
                r"SELECT substr(student_id, 5, 2) AS class_code,
                         MAX(CAST(substr(student_id, 7, 3) AS INTEGER)) AS serial
                    FROM students
                    GROUP BY class_code
                    ORDER BY class_code",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok::<_, StoreError>(rows)
        })
        .await
    }
}

/// 记录存储层故障后原样返回
pub(crate) async fn logged<T>(
    op: &str,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let result = fut.await;
    if let Err(err) = &result {
        if err.is_fatal() {
            error!("{} failed: {}", op, err);
        }
    }
    result
}

async fn find(
    conn: &mut SqliteConnection,
    student_id: &str,
) -> Result<Option<StudentRecord>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM students WHERE student_id = ?1",
        RECORD_COLUMNS
    ))
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await
}

async fn insert_row(
    conn: &mut SqliteConnection,
    student: &NewStudent,
    major: &str,
    now: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"INSERT INTO students
            (student_id, name, gender, age, class_name, major, enrollment_date, score,
             created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
    )
    .bind(student.student_id.as_str())
    .bind(student.name.as_str())
    .bind(student.gender.as_str())
    .bind(student.age)
    .bind(student.class_name.as_str())
    .bind(major)
    .bind(student.enrollment_date.as_str())
    .bind(student.score)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn derived_major(student: &NewStudent) -> Result<&'static str, StoreError> {
    student.major().ok_or_else(|| {
        ValidationError::new(Field::ClassName, format!("班级{}无效", student.class_name)).into()
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn duplicate_or_fault(err: sqlx::Error, student_id: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::DuplicateKey(student_id.to_string())
    } else {
        StoreError::Storage(err)
    }
}

/// 由存储层生成的时间戳, 精确到微秒, 可按文本排序
fn timestamp() -> Result<String, StoreError> {
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");
    Ok(OffsetDateTime::now_utc().format(format)?)
}
