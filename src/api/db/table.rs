use serde::Serialize;

/// 班级人数
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassCount {
    pub class_name: String,
    pub count: i64,
}

/// 专业成绩统计
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MajorStats {
    pub major: String,
    pub student_count: i64,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
}

/// 性别人数
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenderCount {
    pub gender: String,
    pub count: i64,
}

/// 各班级当前已使用的最大流水号
#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct ClassSerial {
    pub class_code: String,
    pub serial: i64,
}
