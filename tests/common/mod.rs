#![allow(dead_code)]

use chrono::NaiveDate;
use wordschool::db::Db;
use wordschool::models::{ModuleType, NewItem, Principal, Role};
use wordschool::services::study::{StudyConfig, StudyService};

pub async fn create_test_db() -> Db {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path =
        std::env::temp_dir().join(format!("wordschool_test_{}_{}.db", std::process::id(), id));
    // Clean up leftover files from previous runs
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
    let url = format!("sqlite://{}", path.display());
    Db::new(&url).await.expect("failed to create test database")
}

/// Four text choices with the correct one at `i % 4`.
pub fn text_items(n: usize) -> Vec<NewItem> {
    (0..n)
        .map(|i| NewItem {
            prompt: format!("word {i}"),
            image_path: None,
            image_url: None,
            choices: (0..4).map(|c| format!("meaning {i}-{c}")).collect(),
            correct_choice_index: Some((i % 4) as i64),
        })
        .collect()
}

/// Answers that get exactly the first `correct` of `n` text items right.
pub fn answers_with_correct(n: usize, correct: usize) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = (0..n)
        .map(|i| {
            let right = (i % 4) as i64;
            let choice = if i < correct { right } else { (right + 1) % 4 };
            (i.to_string(), serde_json::Value::from(choice))
        })
        .collect();
    serde_json::Value::Object(map)
}

pub struct Fixture {
    pub db: Db,
    pub campus_id: i64,
    pub class_id: i64,
    pub student_id: i64,
    pub module_id: i64,
    pub assignment_id: i64,
}

impl Fixture {
    pub fn principal(&self) -> Principal {
        Principal {
            student_id: self.student_id,
            role: Role::Student,
        }
    }

    pub fn service(&self) -> StudyService {
        StudyService::new(self.db.clone(), StudyConfig::default())
    }

    pub async fn login(&self) -> String {
        self.db
            .create_student_session(self.student_id, Role::Student)
            .await
            .expect("create login session")
    }
}

/// One campus, class, enrolled student and a text module with `item_count`
/// items assigned to the class.
pub async fn seed(item_count: usize) -> Fixture {
    let db = create_test_db().await;
    let campus_id = db.create_campus("Shibuya").await.expect("create campus");
    let class_id = db.create_class(campus_id, "A1").await.expect("create class");
    let student_id = db.create_student(campus_id, "Aiko").await.expect("create student");
    db.enroll_student(class_id, student_id)
        .await
        .expect("enroll student");
    let module_id = db
        .create_module("Fruits", ModuleType::PairText, &text_items(item_count))
        .await
        .expect("create module");
    let assignment_id = db
        .assign_module(class_id, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), module_id)
        .await
        .expect("assign module");

    Fixture {
        db,
        campus_id,
        class_id,
        student_id,
        module_id,
        assignment_id,
    }
}
