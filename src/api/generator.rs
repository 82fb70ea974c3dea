//! 示例数据生成
//!
//! 每次生成使用一个独立的[`GeneratorSession`], 其中保存随机数生成器与各班级的
//! 流水号计数器. 相同的种子与参数总会得到相同的数据.

use std::collections::HashMap;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use time::macros::{date, format_description};
use time::{Date, Duration};

use super::db::{BulkOutcome, ClassSerial, Store};
use super::err::StoreError;
use super::student::{format_student_id, ClassInfo, Gender, NewStudent, CLASSES};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_COUNT: usize = 200;

const SCORE_MEAN: f64 = 75.0;
const SCORE_STD_DEV: f64 = 15.0;
const MAX_SERIAL: u32 = 999;
const FIRST_ENROLLMENT: Date = date!(2021-01-01);
const LAST_ENROLLMENT: Date = date!(2024-12-31);

const SURNAMES: &[&str] = &[
    "王", "李", "张", "刘", "陈", "杨", "黄", "赵", "吴", "周", "徐", "孙", "马", "朱", "胡", "郭",
    "何", "高", "林", "罗", "郑", "梁", "谢", "宋", "唐", "许", "韩", "冯", "邓", "曹", "彭", "曾",
    "欧阳", "司马", "诸葛",
];

const GIVEN_CHARS: &[&str] = &[
    "伟", "芳", "娜", "敏", "静", "丽", "强", "磊", "军", "洋", "勇", "艳", "杰", "娟", "涛", "明",
    "超", "秀", "霞", "平", "刚", "桂", "英", "华", "文", "辉", "鑫", "宇", "浩", "欣", "婷", "晨",
    "博", "佳", "雪", "琳", "思", "雨", "子", "涵", "梓", "睿", "嘉", "俊", "怡", "轩", "瑶", "萱",
];

/// 生成进度所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generating,
    Inserting,
    Finished { success: usize, failed: usize },
}

/// 进度回调的参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub stage: Stage,
}

impl Progress {
    pub fn message(&self) -> String {
        match self.stage {
            Stage::Generating => format!("正在生成数据... ({}/{})", self.completed, self.total),
            Stage::Inserting => "正在插入数据库...".to_string(),
            Stage::Finished { success, .. } => format!("完成！成功插入{}条数据", success),
        }
    }
}

/// 按班级顺序平均分配, 前`total % 班级数`个班级各多一人
pub fn class_distribution(total: usize) -> Vec<(&'static ClassInfo, usize)> {
    let base = total / CLASSES.len();
    let remainder = total % CLASSES.len();
    CLASSES
        .iter()
        .enumerate()
        .map(|(i, class)| (class, base + usize::from(i < remainder)))
        .collect()
}

pub struct GeneratorSession {
    rng: StdRng,
    // class code -> last serial handed out
    counters: HashMap<&'static str, u32>,
}

impl GeneratorSession {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counters: HashMap::new(),
        }
    }

    /// 从已有的最大流水号继续编号
    pub fn resume(seed: u64, serials: &[ClassSerial]) -> Self {
        let mut session = Self::new(seed);
        for row in serials {
            if let Some(class) = CLASSES.iter().find(|c| c.code == row.class_code) {
                let serial = u32::try_from(row.serial).unwrap_or(0).min(MAX_SERIAL);
                session.counters.insert(class.code, serial);
            }
        }
        session
    }

    /// 以数据库中当前的最大流水号开始一个新会话
    pub async fn resume_from(store: &Store, seed: u64) -> Result<Self, StoreError> {
        let serials = store.max_serials().await?;
        Ok(Self::resume(seed, &serials))
    }

    pub fn reset_counters(&mut self) {
        self.counters.clear();
    }

    pub fn next_student_id(&mut self, class: &'static ClassInfo) -> Result<String, StoreError> {
        let counter = self.counters.entry(class.code).or_insert(0);
        if *counter >= MAX_SERIAL {
            return Err(StoreError::SerialExhausted(class.name.to_string()));
        }
        *counter += 1;
        Ok(format_student_id(class, *counter))
    }

    fn name(&mut self) -> String {
        let mut name = SURNAMES[self.rng.gen_range(0..SURNAMES.len())].to_string();
        let given = self.rng.gen_range(1..=2);
        for _ in 0..given {
            name.push_str(GIVEN_CHARS[self.rng.gen_range(0..GIVEN_CHARS.len())]);
        }
        name
    }

    /// 正态分布, 限制在 [0,100] 并保留一位小数
    fn score(&mut self) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        let score = (SCORE_MEAN + SCORE_STD_DEV * z).clamp(0.0, 100.0);
        (score * 10.0).round() / 10.0
    }

    fn enrollment_date(&mut self) -> Result<String, StoreError> {
        let span = (LAST_ENROLLMENT - FIRST_ENROLLMENT).whole_days();
        let day = FIRST_ENROLLMENT + Duration::days(self.rng.gen_range(0..=span));
        Ok(day.format(format_description!("[year]-[month]-[day]"))?)
    }

    pub fn generate_student(&mut self, class: &'static ClassInfo) -> Result<NewStudent, StoreError> {
        let student_id = self.next_student_id(class)?;
        let gender = Gender::ALL[self.rng.gen_range(0..Gender::ALL.len())];
        Ok(NewStudent {
            student_id,
            name: self.name(),
            gender: gender.as_str().to_string(),
            age: self.rng.gen_range(18..=25),
            class_name: class.name.to_string(),
            enrollment_date: self.enrollment_date()?,
            score: self.score(),
        })
    }

    /// 生成`count`个学生, 每生成一个调用一次`progress`, 最后整体打乱顺序
    pub fn generate(
        &mut self,
        count: usize,
        mut progress: impl FnMut(Progress),
    ) -> Result<Vec<NewStudent>, StoreError> {
        let mut students = Vec::with_capacity(count);
        for (class, class_count) in class_distribution(count) {
            for _ in 0..class_count {
                students.push(self.generate_student(class)?);
                progress(Progress {
                    completed: students.len(),
                    total: count,
                    stage: Stage::Generating,
                });
            }
            debug!("generated {} students for {}", class_count, class.name);
        }
        students.shuffle(&mut self.rng);
        Ok(students)
    }
}

/// 生成数据并批量写入
pub async fn populate(
    store: &Store,
    session: &mut GeneratorSession,
    count: usize,
    mut progress: impl FnMut(Progress),
) -> Result<BulkOutcome, StoreError> {
    let students = session.generate(count, &mut progress)?;

    progress(Progress {
        completed: count,
        total: count,
        stage: Stage::Inserting,
    });
    let outcome = store.bulk_insert(&students).await?;
    progress(Progress {
        completed: outcome.success,
        total: count,
        stage: Stage::Finished {
            success: outcome.success,
            failed: outcome.failed,
        },
    });

    info!(
        "populated {} of {} generated students",
        outcome.success, count
    );
    Ok(outcome)
}
