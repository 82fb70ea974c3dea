//! 学生数据校验
//!
//! 每个字段一个校验函数, 失败时返回带有字段名与原因的[`ValidationError`],
//! 由调用方根据返回值分支处理.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use time::macros::format_description;

use super::err::{Field, ValidationError};
use super::student::{class_by_code, class_by_name, Gender, NewStudent, CLASSES, YEAR_PREFIX};

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{9}$").expect("valid id regex"));
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\u{4e00}-\u{9fa5}a-zA-Z\s·]+$").expect("valid name regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date regex"));

type Outcome = Result<(), ValidationError>;

fn fail(field: Field, reason: impl Into<String>) -> Outcome {
    Err(ValidationError::new(field, reason))
}

/// 学号格式: 2024 + 班级代码(2位) + 流水号(3位), 共9位数字
pub fn validate_student_id(student_id: &str) -> Outcome {
    if student_id.is_empty() {
        return fail(Field::StudentId, "学号不能为空");
    }
    if !ID_RE.is_match(student_id) {
        return fail(Field::StudentId, "学号必须为9位数字");
    }
    if !student_id.starts_with(YEAR_PREFIX) {
        return fail(Field::StudentId, format!("学号必须以{}开头", YEAR_PREFIX));
    }
    // the id is all ascii digits past this point, byte slicing is safe
    let class_code = &student_id[4..6];
    if class_by_code(class_code).is_none() {
        return fail(Field::StudentId, format!("班级代码{}无效", class_code));
    }
    match student_id[6..9].parse::<u32>() {
        Ok(serial) if (1..=999).contains(&serial) => Ok(()),
        _ => fail(Field::StudentId, "流水号必须在001-999之间"),
    }
}

pub fn validate_name(name: &str) -> Outcome {
    if name.is_empty() {
        return fail(Field::Name, "姓名不能为空");
    }
    let len = name.chars().count();
    if !(2..=20).contains(&len) {
        return fail(Field::Name, "姓名长度必须在2-20个字符之间");
    }
    if !NAME_RE.is_match(name) {
        return fail(Field::Name, "姓名只能包含中文、英文字母和空格");
    }
    Ok(())
}

pub fn validate_age(age: i64) -> Outcome {
    if !(1..=100).contains(&age) {
        return fail(Field::Age, "年龄必须在1-100岁之间");
    }
    Ok(())
}

pub fn validate_score(score: f64) -> Outcome {
    if score.is_nan() {
        return fail(Field::Score, "成绩必须为数字");
    }
    if !(0.0..=100.0).contains(&score) {
        return fail(Field::Score, "成绩必须在0-100分之间");
    }
    Ok(())
}

/// 只接受`YYYY-MM-DD`, 且必须是真实存在的日期
pub fn validate_date(date: &str) -> Outcome {
    if date.is_empty() {
        return fail(Field::EnrollmentDate, "日期不能为空");
    }
    let format = format_description!("[year]-[month]-[day]");
    if !DATE_RE.is_match(date) || time::Date::parse(date, format).is_err() {
        return fail(Field::EnrollmentDate, "日期格式必须为YYYY-MM-DD");
    }
    Ok(())
}

pub fn validate_gender(gender: &str) -> Outcome {
    match Gender::from_label(gender) {
        Some(_) => Ok(()),
        None => fail(Field::Gender, "性别必须是男或女"),
    }
}

pub fn validate_class(class_name: &str) -> Outcome {
    if class_by_name(class_name).is_some() {
        return Ok(());
    }
    let names: Vec<&str> = CLASSES.iter().map(|class| class.name).collect();
    fail(
        Field::ClassName,
        format!("班级必须是以下之一：{}", names.join(", ")),
    )
}

/// 依次校验所有字段, 返回第一个失败的字段
pub fn validate_student(student: &NewStudent) -> Outcome {
    validate_student_id(&student.student_id)?;
    validate_name(&student.name)?;
    validate_age(student.age)?;
    validate_score(student.score)?;
    validate_date(&student.enrollment_date)?;
    validate_gender(&student.gender)?;
    validate_class(&student.class_name)
}

const REQUIRED_FIELDS: [Field; 7] = [
    Field::StudentId,
    Field::Name,
    Field::Gender,
    Field::Age,
    Field::ClassName,
    Field::EnrollmentDate,
    Field::Score,
];

/// 解析并校验表单提交的原始数据
///
/// 表单中的`major`会被忽略, 专业总是由班级推导. 年龄必须是整数,
/// 即使是`"20"`或`20.0`这样数值上合法的输入也会被拒绝; 成绩可以是数字
/// 或能转换为数字的字符串.
pub fn parse_form(form: &Value) -> Result<NewStudent, ValidationError> {
    let empty = Map::new();
    let map = form.as_object().unwrap_or(&empty);

    for field in REQUIRED_FIELDS {
        match map.get(field.key()) {
            None | Some(Value::Null) => return Err(ValidationError::missing(field)),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::missing(field))
            }
            _ => {}
        }
    }

    let text = |field: Field| -> Result<String, ValidationError> {
        match map.get(field.key()) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(ValidationError::new(
                field,
                format!("{}必须为文本", field.label()),
            )),
        }
    };

    let age = match map.get(Field::Age.key()) {
        Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or_default(),
        _ => return Err(ValidationError::new(Field::Age, "年龄必须为整数")),
    };

    let score = match map.get(Field::Score.key()) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ValidationError::new(Field::Score, "成绩必须为数字"))?;

    let student = NewStudent {
        student_id: text(Field::StudentId)?,
        name: text(Field::Name)?,
        gender: text(Field::Gender)?,
        age,
        class_name: text(Field::ClassName)?,
        enrollment_date: text(Field::EnrollmentDate)?,
        score,
    };
    validate_student(&student)?;
    Ok(student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_student() -> NewStudent {
        NewStudent {
            student_id: "202401001".to_string(),
            name: "李明".to_string(),
            gender: "男".to_string(),
            age: 20,
            class_name: "计算机一班".to_string(),
            enrollment_date: "2024-09-01".to_string(),
            score: 85.5,
        }
    }

    #[test]
    fn test_student_id_rules() {
        assert!(validate_student_id("202401001").is_ok());
        assert!(validate_student_id("202405999").is_ok());

        let err = validate_student_id("").unwrap_err();
        assert_eq!(err.reason, "学号不能为空");
        let err = validate_student_id("12345").unwrap_err();
        assert_eq!(err.reason, "学号必须为9位数字");
        assert_eq!(err.field, Field::StudentId);
        let err = validate_student_id("20240100a").unwrap_err();
        assert_eq!(err.reason, "学号必须为9位数字");
        let err = validate_student_id("202301001").unwrap_err();
        assert_eq!(err.reason, "学号必须以2024开头");
        let err = validate_student_id("202499001").unwrap_err();
        assert_eq!(err.reason, "班级代码99无效");
        let err = validate_student_id("202401000").unwrap_err();
        assert_eq!(err.reason, "流水号必须在001-999之间");
    }

    #[test]
    fn test_name_rules() {
        assert!(validate_name("王小明").is_ok());
        assert!(validate_name("John Smith").is_ok());
        assert!(validate_name("阿卜杜·热合曼").is_ok());
        assert_eq!(validate_name("").unwrap_err().reason, "姓名不能为空");
        assert_eq!(
            validate_name("王").unwrap_err().reason,
            "姓名长度必须在2-20个字符之间"
        );
        // 20 code points are fine even though they take 60 bytes
        assert!(validate_name(&"王".repeat(20)).is_ok());
        assert!(validate_name(&"王".repeat(21)).is_err());
        assert_eq!(
            validate_name("张三3").unwrap_err().reason,
            "姓名只能包含中文、英文字母和空格"
        );
    }

    #[test]
    fn test_range_rules() {
        assert!(validate_age(1).is_ok());
        assert!(validate_age(100).is_ok());
        assert!(validate_age(0).is_err());
        assert!(validate_age(101).is_err());

        assert!(validate_score(0.0).is_ok());
        assert!(validate_score(100.0).is_ok());
        assert!(validate_score(-0.1).is_err());
        assert!(validate_score(100.1).is_err());
        assert_eq!(validate_score(f64::NAN).unwrap_err().reason, "成绩必须为数字");
    }

    #[test]
    fn test_date_rules() {
        assert!(validate_date("2024-02-29").is_ok());
        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("2024-9-1").is_err());
        assert!(validate_date("2024/09/01").is_err());
        assert!(validate_date("").is_err());
    }

    #[test]
    fn test_enum_rules() {
        assert!(validate_gender("女").is_ok());
        assert!(validate_gender("female").is_err());
        assert!(validate_gender(" 男").is_err());
        assert!(validate_class("人工智能班").is_ok());
        let err = validate_class("人工智能二班").unwrap_err();
        assert_eq!(err.field, Field::ClassName);
        assert!(err.reason.starts_with("班级必须是以下之一"));
    }

    #[test]
    fn test_validate_student_reports_first_failure() {
        assert!(validate_student(&valid_student()).is_ok());

        let mut student = valid_student();
        student.student_id = "12345".to_string();
        student.age = 0;
        let err = validate_student(&student).unwrap_err();
        assert_eq!(err.field, Field::StudentId);
        assert_eq!(err.reason, "学号必须为9位数字");

        let mut student = valid_student();
        student.student_id = "202499001".to_string();
        assert_eq!(
            validate_student(&student).unwrap_err().reason,
            "班级代码99无效"
        );

        let mut student = valid_student();
        student.gender = "未知".to_string();
        student.class_name = "不存在".to_string();
        assert_eq!(validate_student(&student).unwrap_err().field, Field::Gender);
    }

    #[test]
    fn test_validate_student_is_conjunction_of_fields() {
        let mut student = valid_student();
        student.score = 120.0;
        let each_ok = validate_student_id(&student.student_id).is_ok()
            && validate_name(&student.name).is_ok()
            && validate_age(student.age).is_ok()
            && validate_score(student.score).is_ok()
            && validate_date(&student.enrollment_date).is_ok()
            && validate_gender(&student.gender).is_ok()
            && validate_class(&student.class_name).is_ok();
        assert_eq!(validate_student(&student).is_ok(), each_ok);
        assert!(!each_ok);
    }

    #[test]
    fn test_parse_form() {
        let form = json!({
            "student_id": "202403012",
            "name": "赵敏",
            "gender": "女",
            "age": 19,
            "class_name": "软件工程一班",
            "major": "人工智能",
            "enrollment_date": "2023-09-01",
            "score": "77.5"
        });
        let student = parse_form(&form).unwrap();
        assert_eq!(student.score, 77.5);
        assert_eq!(student.major(), Some("软件工程"));

        let mut missing = form.clone();
        missing["name"] = json!("");
        assert_eq!(parse_form(&missing).unwrap_err().reason, "姓名不能为空");

        let mut float_age = form.clone();
        float_age["age"] = json!(19.0);
        assert_eq!(parse_form(&float_age).unwrap_err().reason, "年龄必须为整数");

        let mut text_age = form.clone();
        text_age["age"] = json!("19");
        assert_eq!(parse_form(&text_age).unwrap_err().field, Field::Age);

        let mut bad_score = form.clone();
        bad_score["score"] = json!("abc");
        assert_eq!(parse_form(&bad_score).unwrap_err().reason, "成绩必须为数字");

        let mut bad_id = form;
        bad_id["student_id"] = json!("202499001");
        assert_eq!(parse_form(&bad_id).unwrap_err().reason, "班级代码99无效");
    }
}
