//! Example answer keys demonstrating the schema.
//!
//! These mirror `data/unit_answers.json` at the workspace root and cover the
//! answer shapes learners submit: scalars, lists, mappings and `null`.

use serde_json::json;

use crate::id::ExerciseId;
use crate::store::{AnswerKeyStore, ExerciseKey};

/// Returns the three canonical example keys.
///
/// # Panics
/// Never panics: all ids and answer counts are hard-coded valid values.
#[must_use]
pub fn example_keys() -> Vec<ExerciseKey> {
    #[expect(clippy::unwrap_used, reason = "ids and answer counts are hard-coded valid values")]
    let key = |id: &str, answers: Vec<serde_json::Value>, points| {
        ExerciseKey::new(ExerciseId::parse(id).unwrap(), answers, points).unwrap()
    };

    vec![
        key("unit1", vec![json!("a"), json!(2), json!(true)], 10),
        key("unit2", vec![json!(15), json!([1, 4, 9]), json!("even")], 20),
        key("unit3", vec![json!({"name": "ada", "age": 36}), json!(3.5), json!(null)], 15),
    ]
}

/// The example keys as a store.
#[must_use]
pub fn example_store() -> AnswerKeyStore {
    example_keys().into_iter().collect()
}
