use std::fmt;

/// 学生记录中可被校验的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    StudentId,
    Name,
    Gender,
    Age,
    ClassName,
    Major,
    EnrollmentDate,
    Score,
}

impl Field {
    /// 字段在表单中的名称
    pub fn label(&self) -> &'static str {
        match self {
            Field::StudentId => "学号",
            Field::Name => "姓名",
            Field::Gender => "性别",
            Field::Age => "年龄",
            Field::ClassName => "班级",
            Field::Major => "专业",
            Field::EnrollmentDate => "入学日期",
            Field::Score => "成绩",
        }
    }

    /// 字段对应的列名, 同时也是表单中的键
    pub fn key(&self) -> &'static str {
        match self {
            Field::StudentId => "student_id",
            Field::Name => "name",
            Field::Gender => "gender",
            Field::Age => "age",
            Field::ClassName => "class_name",
            Field::Major => "major",
            Field::EnrollmentDate => "enrollment_date",
            Field::Score => "score",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 字段校验失败
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// 必填字段缺失
    pub fn missing(field: Field) -> Self {
        Self::new(field, format!("{}不能为空", field.label()))
    }
}

/// 记录存储相关的错误
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// 数据校验失败
    #[error("数据校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// 学号已存在
    #[error("学号 {0} 已存在")]
    DuplicateKey(String),
    /// 学号不存在
    #[error("学号 {0} 不存在")]
    NotFound(String),
    /// 没有需要更新的字段
    #[error("没有要更新的字段")]
    NoOp,
    /// 班级流水号已用完
    #[error("{0} 的流水号已超过999")]
    SerialExhausted(String),
    /// 数据库错误
    #[error("数据库错误: {0}")]
    Storage(#[from] sqlx::Error),
    /// 文件读写失败
    #[error("读取文件失败: {0}")]
    Io(#[from] std::io::Error),
    /// csv处理错误
    #[error("解析csv失败: {0}")]
    Csv(#[from] csv::Error),
    /// 时间格式化失败
    #[error("时间格式化失败: {0}")]
    Time(#[from] time::error::Format),
}

impl StoreError {
    /// 存储层故障, 操作未生效, 调用方只能提示失败
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(_) | StoreError::Io(_) | StoreError::Csv(_) | StoreError::Time(_)
        )
    }
}
