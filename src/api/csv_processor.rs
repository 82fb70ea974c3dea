use std::path::Path;

use log::warn;
use serde::Deserialize;

use super::err::{Field, StoreError, ValidationError};
use super::student::{NewStudent, StudentRecord};
use super::validator::validate_student;

// 行记录, 所有列按文本读取后再转换, 以便逐行报告错误
#[derive(Deserialize)]
pub struct RowRecord {
    // 学号
    pub student_id: String,
    // 姓名
    pub name: String,
    // 性别
    pub gender: String,
    // 年龄
    pub age: String,
    // 班级
    pub class_name: String,
    // 入学日期
    pub enrollment_date: String,
    // 成绩
    pub score: String,
}

impl RowRecord {
    fn into_student(self) -> Result<NewStudent, ValidationError> {
        let age = self
            .age
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::new(Field::Age, "年龄必须为整数"))?;
        let score = self
            .score
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::new(Field::Score, "成绩必须为数字"))?;
        let student = NewStudent {
            student_id: self.student_id,
            name: self.name,
            gender: self.gender,
            age,
            class_name: self.class_name,
            enrollment_date: self.enrollment_date,
            score,
        };
        validate_student(&student)?;
        Ok(student)
    }
}

/// 被拒绝的行
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// csv中的行号, 表头为第1行
    pub line: u64,
    pub field: Option<Field>,
    pub reason: String,
}

/// csv的读取结果
#[derive(Debug, Default)]
pub struct CsvTable {
    pub students: Vec<NewStudent>,
    pub rejected: Vec<RejectedRow>,
}

/// 读取并逐行校验csv, 列按表头名称匹配, 多余的列(如专业, 时间戳)被忽略
pub fn read_students(csv_path: &Path) -> Result<CsvTable, StoreError> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    let headers = rdr.headers()?.clone();
    let mut table = CsvTable::default();

    for row in rdr.records() {
        // 行号取记录起始的物理行, 带引号的字段可能跨行
        let rejected = match row {
            Ok(record) => {
                let line = record.position().map_or(0, |pos| pos.line());
                let parsed = record
                    .deserialize::<RowRecord>(Some(&headers))
                    .map_err(|err| RejectedRow {
                        line,
                        field: None,
                        reason: err.to_string(),
                    })
                    .and_then(|row| {
                        row.into_student().map_err(|err| RejectedRow {
                            line,
                            field: Some(err.field),
                            reason: err.reason,
                        })
                    });
                match parsed {
                    Ok(student) => {
                        table.students.push(student);
                        continue;
                    }
                    Err(rejected) => rejected,
                }
            }
            Err(err) => RejectedRow {
                line: err.position().map_or(0, |pos| pos.line()),
                field: None,
                reason: err.to_string(),
            },
        };
        warn!("{} 第{}行: {}", csv_path.display(), rejected.line, rejected.reason);
        table.rejected.push(rejected);
    }

    Ok(table)
}

/// 将记录写入csv, 表头为字段名
pub fn write_records(csv_path: &Path, records: &[StudentRecord]) -> Result<(), StoreError> {
    let mut wtr = csv::Writer::from_path(csv_path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::student::Gender;
    use std::{fs::File, io::Write};
    use tempfile::tempdir;

    #[test]
    fn test_read_students_reports_bad_rows() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("students.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "student_id,name,gender,age,class_name,major,enrollment_date,score").unwrap();
        writeln!(file, "202401001,张伟,男,20,计算机一班,计算机科学与技术,2024-09-01,88.5").unwrap();
        writeln!(file, "202401002,李娜,女,20.5,计算机一班,,2024-09-01,90").unwrap();
        writeln!(file, "202499001,王芳,女,19,计算机一班,,2024-09-01,70").unwrap();
        writeln!(file, "202405001,Alice Wang,女,21,人工智能班,,2023-09-01, 66").unwrap();
        writeln!(file, "202405002,赵强").unwrap();

        let table = read_students(&file_path).unwrap();
        assert_eq!(table.students.len(), 2);
        assert_eq!(table.students[1].name, "Alice Wang");
        assert_eq!(table.students[1].score, 66.0);

        assert_eq!(table.rejected.len(), 3);
        assert_eq!(table.rejected[0].line, 3);
        assert_eq!(table.rejected[0].field, Some(Field::Age));
        assert_eq!(table.rejected[1].reason, "班级代码99无效");
        assert_eq!(table.rejected[2].line, 6);
        assert_eq!(table.rejected[2].field, None);
    }

    #[test]
    fn test_rejected_line_follows_multiline_fields() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("quoted.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "student_id,name,gender,age,class_name,enrollment_date,score").unwrap();
        writeln!(file, "202401001,\"Alice\nWang\",女,20,计算机一班,2024-09-01,88").unwrap();
        writeln!(file, "202401002,李娜,女,二十,计算机一班,2024-09-01,90").unwrap();

        let table = read_students(&file_path).unwrap();
        assert_eq!(table.students.len(), 1);
        assert_eq!(table.students[0].name, "Alice\nWang");
        assert_eq!(table.rejected.len(), 1);
        assert_eq!(table.rejected[0].line, 4);
        assert_eq!(table.rejected[0].field, Some(Field::Age));
    }

    #[test]
    fn test_write_then_read_back() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("export.csv");
        let record = StudentRecord {
            student_id: "202403010".to_string(),
            name: "陈静".to_string(),
            gender: Gender::Female,
            age: 22,
            class_name: "软件工程一班".to_string(),
            major: "软件工程".to_string(),
            enrollment_date: "2022-09-01".to_string(),
            score: 93.5,
            created_at: "2024-09-01 08:00:00.000000".to_string(),
            updated_at: "2024-09-02 08:00:00.000000".to_string(),
        };

        write_records(&file_path, &[record.clone()]).unwrap();
        let header = std::fs::read_to_string(&file_path).unwrap();
        assert!(header.starts_with("student_id,name,gender,age,class_name,major,"));

        let table = read_students(&file_path).unwrap();
        assert!(table.rejected.is_empty());
        assert_eq!(table.students, vec![NewStudent::from(record)]);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempdir().unwrap();
        let result = read_students(&temp_dir.path().join("missing.csv"));
        assert!(matches!(result, Err(StoreError::Csv(_))));
    }
}
