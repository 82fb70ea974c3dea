use std::fmt;

use serde::{Deserialize, Serialize};
use time::macros::format_description;

/// 学号前缀(入学年份)
pub const YEAR_PREFIX: &str = "2024";

/// 班级信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassInfo {
    /// 班级名称
    pub name: &'static str,
    /// 学号中的两位班级代码
    pub code: &'static str,
    /// 班级所属专业
    pub major: &'static str,
}

/// 固定的班级列表, 顺序即生成数据时的分配顺序
pub static CLASSES: [ClassInfo; 5] = [
    ClassInfo {
        name: "计算机一班",
        code: "01",
        major: "计算机科学与技术",
    },
    ClassInfo {
        name: "计算机二班",
        code: "02",
        major: "计算机科学与技术",
    },
    ClassInfo {
        name: "软件工程一班",
        code: "03",
        major: "软件工程",
    },
    ClassInfo {
        name: "软件工程二班",
        code: "04",
        major: "软件工程",
    },
    ClassInfo {
        name: "人工智能班",
        code: "05",
        major: "人工智能",
    },
];

pub fn class_by_name(name: &str) -> Option<&'static ClassInfo> {
    CLASSES.iter().find(|class| class.name == name)
}

pub fn class_by_code(code: &str) -> Option<&'static ClassInfo> {
    CLASSES.iter().find(|class| class.code == code)
}

/// 根据班级获取对应的专业
pub fn major_of(class_name: &str) -> Option<&'static str> {
    class_by_name(class_name).map(|class| class.major)
}

/// 拼接学号: 年份 + 班级代码 + 三位流水号
pub fn format_student_id(class: &ClassInfo, serial: u32) -> String {
    format!("{}{}{:03}", YEAR_PREFIX, class.code, serial)
}

/// 性别, 数据库与csv中均以"男"/"女"存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Gender {
    #[serde(rename = "男")]
    #[sqlx(rename = "男")]
    Male,
    #[serde(rename = "女")]
    #[sqlx(rename = "女")]
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "男",
            Gender::Female => "女",
        }
    }

    /// 严格按字符串匹配, 不做大小写或空白处理
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|gender| gender.as_str() == label)
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 数据库中的一条学生记录
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StudentRecord {
    // 学号
    pub student_id: String,
    // 姓名
    pub name: String,
    // 性别
    pub gender: Gender,
    // 年龄
    pub age: i64,
    // 班级
    pub class_name: String,
    // 专业
    pub major: String,
    // 入学日期
    pub enrollment_date: String,
    // 成绩
    pub score: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// 待插入的学生, 专业由班级推导, 不由调用方提供
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub gender: String,
    pub age: i64,
    pub class_name: String,
    pub enrollment_date: String,
    pub score: f64,
}

impl NewStudent {
    /// 由班级推导出的专业, 班级非法时为`None`
    pub fn major(&self) -> Option<&'static str> {
        major_of(&self.class_name)
    }
}

impl From<StudentRecord> for NewStudent {
    fn from(record: StudentRecord) -> Self {
        Self {
            student_id: record.student_id,
            name: record.name,
            gender: record.gender.as_str().to_string(),
            age: record.age,
            class_name: record.class_name,
            enrollment_date: record.enrollment_date,
            score: record.score,
        }
    }
}

/// 部分更新, 学号与创建时间不可修改
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub class_name: Option<String>,
    pub enrollment_date: Option<String>,
    pub score: Option<f64>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.gender.is_none()
            && self.age.is_none()
            && self.class_name.is_none()
            && self.enrollment_date.is_none()
            && self.score.is_none()
    }

    /// 将修改合并到已有记录上
    pub fn apply(&self, current: StudentRecord) -> NewStudent {
        let mut student = NewStudent::from(current);
        if let Some(name) = &self.name {
            student.name = name.clone();
        }
        if let Some(gender) = &self.gender {
            student.gender = gender.clone();
        }
        if let Some(age) = self.age {
            student.age = age;
        }
        if let Some(class_name) = &self.class_name {
            student.class_name = class_name.clone();
        }
        if let Some(date) = &self.enrollment_date {
            student.enrollment_date = date.clone();
        }
        if let Some(score) = self.score {
            student.score = score;
        }
        student
    }
}

/// 成绩等级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLevel {
    Excellent,
    Good,
    Medium,
    Pass,
    Fail,
}

impl ScoreLevel {
    pub fn of(score: f64) -> Self {
        if score >= 90.0 {
            ScoreLevel::Excellent
        } else if score >= 80.0 {
            ScoreLevel::Good
        } else if score >= 70.0 {
            ScoreLevel::Medium
        } else if score >= 60.0 {
            ScoreLevel::Pass
        } else {
            ScoreLevel::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreLevel::Excellent => "优秀",
            ScoreLevel::Good => "良好",
            ScoreLevel::Medium => "中等",
            ScoreLevel::Pass => "及格",
            ScoreLevel::Fail => "不及格",
        }
    }
}

impl fmt::Display for ScoreLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 成绩保留一位小数显示
pub fn format_score(score: f64) -> String {
    format!("{:.1}", score)
}

/// 将`YYYY-MM-DD`转换为`YYYY年MM月DD日`, 无法解析时原样返回
pub fn format_date(date: &str) -> String {
    let input = format_description!("[year]-[month]-[day]");
    let output = format_description!("[year]年[month]月[day]日");
    time::Date::parse(date, input)
        .ok()
        .and_then(|d| d.format(output).ok())
        .unwrap_or_else(|| date.to_string())
}
