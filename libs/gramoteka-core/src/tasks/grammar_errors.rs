//! Grammar error classification. The canonical answer is an error-kind key
//! (or `no_error` for clean sentences). The drill asks to classify one
//! flawed sentence among ten labelled kinds; the exam shows nine sentences
//! (five flawed, four clean) and five lettered error kinds, answered with a
//! digit per letter in letter order.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TaskError};
use crate::types::{GradeResult, Session, TaskOption, TaskPayload};

use super::{
    current_exercise, decode_config, decode_content, digit_set, escape_html,
    expect_exercise_count, ordered_by_ids, parent_category_id, TaskContext, TaskProcessor,
};

const EXAM_FLAWED: usize = 5;
const EXAM_CLEAN: usize = 4;
const EXAM_TOTAL: usize = EXAM_FLAWED + EXAM_CLEAN;

const NO_ERROR_ANSWER: &str = "no_error";

const LETTERS: [&str; 5] = ["А", "Б", "В", "Г", "Д"];

/// (answer key, full description, short button label)
const ERROR_KINDS: [(&str, &str, &str); 10] = [
    (
        "participial_clause_error",
        "нарушение в построении предложения с причастным оборотом",
        "Причастный оборот",
    ),
    (
        "homogeneous_members_error",
        "ошибка в построении предложения с однородными членами",
        "Однородные члены",
    ),
    (
        "adverbial_participle_error",
        "неправильное построение предложения с деепричастным оборотом",
        "Деепричастный оборот",
    ),
    (
        "prepositional_case_error",
        "неправильное употребление падежной формы существительного с предлогом",
        "Падеж с предлогом",
    ),
    (
        "subject_predicate_agreement",
        "нарушение связи между подлежащим и сказуемым",
        "Подлежащее и сказуемое",
    ),
    (
        "mismatched_appositive_error",
        "нарушение в построении предложения с несогласованным приложением",
        "Несогл. приложение",
    ),
    (
        "complex_sentence_error",
        "ошибка в построении сложного предложения",
        "Сложное предложение",
    ),
    (
        "indirect_speech_error",
        "неправильное построение предложения с косвенной речью",
        "Косвенная речь",
    ),
    (
        "verb_aspect_tense_error",
        "нарушение видо-временной соотнесённости глагольных форм",
        "Видо-время глаголов",
    ),
    (
        "numeral_usage_error",
        "неправильное употребление имени числительного",
        "Числительное",
    ),
];

fn description_for(kind: &str) -> &str {
    ERROR_KINDS
        .iter()
        .find(|(key, _, _)| *key == kind)
        .map(|(_, description, _)| *description)
        .unwrap_or(kind)
}

fn label_for(kind: &str) -> &str {
    ERROR_KINDS
        .iter()
        .find(|(key, _, _)| *key == kind)
        .map(|(_, _, label)| *label)
        .unwrap_or(kind)
}

#[derive(Debug, Deserialize)]
struct SentenceContent {
    sentence: String,
    #[serde(default)]
    corrected_sentence: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GrammarErrorExamConfig {
    exercise_ids: Vec<i64>,
    /// Error kinds in letter order А-Д.
    error_type_order: Vec<String>,
}

pub struct GrammarErrorDrill {
    ctx: TaskContext,
}

impl GrammarErrorDrill {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for GrammarErrorDrill {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let picked = self
            .ctx
            .exercises
            .random_with_content_field(pool_id, "corrected_sentence", 1)
            .await?;
        let exercise = picked
            .first()
            .ok_or(TaskError::NoContent { category_id: pool_id })?;

        let content: SentenceContent = decode_content(exercise)?;
        let options = ERROR_KINDS
            .iter()
            .map(|(key, _, label)| TaskOption::new(*label, *key))
            .collect();

        let prompt = format!(
            "<b>Определите тип грамматической ошибки в предложении.</b>\n\n<i>{}</i>",
            content.sentence
        );
        Ok(TaskPayload::single(prompt, Some(options), exercise.id))
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        let exercise = current_exercise(session)?;
        let is_correct = submission == exercise.answer;

        self.ctx
            .log_answer(session, exercise.id, is_correct, submission, None)
            .await?;

        let content: SentenceContent = decode_content(exercise)?;
        let mut parts = Vec::new();
        if is_correct {
            parts.push(format!("<b>Ответ:</b> {}", label_for(&exercise.answer)));
        } else {
            parts.push(format!("<b>Ваш ответ:</b> {}", label_for(submission)));
            parts.push(format!(
                "<b>Правильный ответ:</b> {}",
                label_for(&exercise.answer)
            ));
        }
        parts.push(format!(
            "\n<b>Исходное предложение:</b>\n<i>{}</i>",
            content.sentence
        ));
        if let Some(corrected) = &content.corrected_sentence {
            parts.push(format!(
                "\n<b>Правильное предложение:</b>\n<i>{corrected}</i>"
            ));
        }
        if !exercise.explanation.is_empty() {
            parts.push(format!("\n<b>Объяснение:</b>\n{}", exercise.explanation));
        }

        Ok(GradeResult {
            is_correct,
            explanation: Some(parts.join("\n")),
        })
    }
}

pub struct GrammarErrorExam {
    ctx: TaskContext,
}

impl GrammarErrorExam {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskProcessor for GrammarErrorExam {
    async fn create_task(&self, session: &Session) -> Result<TaskPayload> {
        let pool_id = parent_category_id(session)?;
        let mut rng = self.ctx.rng.rng();

        // Five flawed sentences with pairwise distinct error kinds, then four
        // clean ones; their kinds gate the clean query, so the calls stay
        // sequential.
        let flawed = self
            .ctx
            .exercises
            .random_with_distinct_answers(pool_id, NO_ERROR_ANSWER, EXAM_FLAWED)
            .await?;
        if flawed.len() < EXAM_FLAWED {
            return Err(TaskError::NoContent { category_id: pool_id });
        }
        let clean = self
            .ctx
            .exercises
            .random_by_answer(pool_id, NO_ERROR_ANSWER, EXAM_CLEAN)
            .await?;
        if clean.len() < EXAM_CLEAN {
            return Err(TaskError::NoContent { category_id: pool_id });
        }

        let mut error_type_order: Vec<String> =
            flawed.iter().map(|e| e.answer.clone()).collect();
        error_type_order.shuffle(&mut rng);

        let mut all: Vec<_> = flawed.into_iter().chain(clean).collect();
        all.shuffle(&mut rng);

        let mut prompt = String::from(
            "<b>Установите соответствие между грамматическими ошибками и предложениями, \
             в которых они допущены: к каждой позиции первого столбца подберите \
             соответствующую позицию из второго столбца.</b>\n\n<b>ГРАММАТИЧЕСКИЕ ОШИБКИ</b>\n",
        );
        for (i, kind) in error_type_order.iter().enumerate() {
            prompt.push_str(&format!("{}) {}\n", LETTERS[i], description_for(kind)));
        }
        prompt.push_str("\n<b>ПРЕДЛОЖЕНИЯ</b>\n");
        for (i, exercise) in all.iter().enumerate() {
            let content: SentenceContent = decode_content(exercise)?;
            prompt.push_str(&format!("{}) {}\n", i + 1, content.sentence));
        }
        prompt.push_str("\nЗапишите в ответ цифры, соответствующие буквам АБВГД.");

        let exercise_ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        let config = GrammarErrorExamConfig {
            exercise_ids: exercise_ids.clone(),
            error_type_order,
        };

        Ok(TaskPayload {
            prompt,
            options: None,
            exercise_ids,
            task_config: Some(serde_json::to_value(config).map_err(anyhow::Error::from)?),
        })
    }

    async fn process_answer(&self, session: &Session, submission: &str) -> Result<GradeResult> {
        expect_exercise_count(session, EXAM_TOTAL)?;
        let config: GrammarErrorExamConfig = decode_config(session)?;
        let ordered = ordered_by_ids(session, &config.exercise_ids)?;

        // Expected digits are positional (one per letter), so the submission
        // is read in order, without the subset-exam sort/dedup.
        let mut correct_answer = String::new();
        for kind in &config.error_type_order {
            let position = ordered
                .iter()
                .position(|e| &e.answer == kind)
                .ok_or_else(|| {
                    TaskError::validation(format!("no displayed sentence for error kind {kind}"))
                })?;
            correct_answer.push_str(&(position + 1).to_string());
        }

        let user_digits: String = submission.chars().filter(|c| c.is_ascii_digit()).collect();
        let is_correct = user_digits == correct_answer;

        let selected = digit_set(submission);
        let batch_id = Uuid::new_v4();
        let mut details = String::new();

        for (i, exercise) in ordered.iter().enumerate() {
            let content: SentenceContent = decode_content(exercise)?;
            let number = i + 1;
            details.push_str("<blockquote expandable>");

            let sentence_correct = if exercise.answer == NO_ERROR_ANSWER {
                details.push_str(&format!("<b>{number}) Нет ошибки</b>\n"));
                details.push_str(&format!(
                    "<b>Предложение:</b> <i>{}</i>\n\n",
                    content.sentence
                ));
                // A clean sentence is answered right by not being picked.
                !selected.contains(&(number as u32))
            } else {
                let letter_index = config
                    .error_type_order
                    .iter()
                    .position(|k| k == &exercise.answer)
                    .ok_or_else(|| {
                        TaskError::validation(format!(
                            "error kind {} is missing from the config",
                            exercise.answer
                        ))
                    })?;
                details.push_str(&format!(
                    "<b>{number}) {} — {}</b>\n",
                    LETTERS[letter_index],
                    description_for(&exercise.answer)
                ));
                details.push_str(&format!(
                    "<b>Исходное предложение:</b> <i>{}</i>\n",
                    content.sentence
                ));
                if let Some(corrected) = &content.corrected_sentence {
                    details.push_str(&format!(
                        "<b>Правильное предложение:</b> <i>{corrected}</i>\n"
                    ));
                }
                if !exercise.explanation.is_empty() {
                    details.push_str(&format!("<b>Объяснение:</b> {}\n\n", exercise.explanation));
                }
                user_digits
                    .chars()
                    .nth(letter_index)
                    .map(|c| c.to_string() == number.to_string())
                    .unwrap_or(false)
            };

            details.push_str("</blockquote>\n");
            self.ctx
                .log_answer(session, exercise.id, sentence_correct, submission, Some(batch_id))
                .await?;
        }

        let explanation = if is_correct {
            format!("<b>Ответ: {correct_answer}</b>\n\n{details}")
        } else {
            format!(
                "Ваш ответ: {}\n<b>Правильный ответ: {correct_answer}</b>\n\n{details}",
                escape_html(&user_digits)
            )
        };

        Ok(GradeResult {
            is_correct,
            explanation: Some(explanation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{exercise, fake_ctx, grading_session, leaf_category, session};
    use crate::types::Exercise;
    use serde_json::json;

    fn flawed(id: i64, kind: &str) -> Exercise {
        exercise(
            id,
            1,
            json!({
                "sentence": format!("Предложение с ошибкой {id}."),
                "corrected_sentence": format!("Предложение без ошибки {id}.")
            }),
            kind,
        )
    }

    fn clean(id: i64) -> Exercise {
        exercise(
            id,
            1,
            json!({"sentence": format!("Чистое предложение {id}.")}),
            NO_ERROR_ANSWER,
        )
    }

    fn full_pool() -> Vec<Exercise> {
        vec![
            flawed(1, "participial_clause_error"),
            flawed(2, "homogeneous_members_error"),
            flawed(3, "adverbial_participle_error"),
            flawed(4, "prepositional_case_error"),
            flawed(5, "subject_predicate_agreement"),
            clean(6),
            clean(7),
            clean(8),
            clean(9),
        ]
    }

    #[tokio::test]
    async fn drill_offers_all_ten_kinds() {
        let (ctx, _) = fake_ctx(vec![flawed(1, "numeral_usage_error")], 4);
        let payload = GrammarErrorDrill::new(ctx)
            .create_task(&session(leaf_category("GRAMMAR_ERROR_DRILL")))
            .await
            .unwrap();
        assert_eq!(payload.options.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn exam_shows_nine_sentences_and_five_letters() {
        let (ctx, _) = fake_ctx(full_pool(), 4);
        let payload = GrammarErrorExam::new(ctx)
            .create_task(&session(leaf_category("GRAMMAR_ERROR_EXAM")))
            .await
            .unwrap();
        assert_eq!(payload.exercise_ids.len(), EXAM_TOTAL);

        let config: GrammarErrorExamConfig =
            serde_json::from_value(payload.task_config.unwrap()).unwrap();
        assert_eq!(config.error_type_order.len(), EXAM_FLAWED);
        assert!(payload.prompt.contains("Д)"));
        assert!(payload.prompt.contains("9)"));
    }

    #[tokio::test]
    async fn exam_needs_enough_distinct_error_kinds() {
        let pool = vec![
            flawed(1, "participial_clause_error"),
            flawed(2, "participial_clause_error"),
            flawed(3, "adverbial_participle_error"),
            clean(6),
            clean(7),
            clean(8),
            clean(9),
        ];
        let (ctx, _) = fake_ctx(pool, 4);
        let err = GrammarErrorExam::new(ctx)
            .create_task(&session(leaf_category("GRAMMAR_ERROR_EXAM")))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NoContent { .. }));
    }

    #[tokio::test]
    async fn exam_grading_is_positional() {
        let (ctx, log) = fake_ctx(Vec::new(), 4);
        // Display order: flawed 1-5 at positions 1-5, clean 6-9 after.
        let config = json!({
            "exercise_ids": [1, 2, 3, 4, 5, 6, 7, 8, 9],
            "error_type_order": [
                "subject_predicate_agreement",   // А -> sentence 5
                "participial_clause_error",      // Б -> sentence 1
                "homogeneous_members_error",     // В -> sentence 2
                "adverbial_participle_error",    // Г -> sentence 3
                "prepositional_case_error"       // Д -> sentence 4
            ]
        });
        let session =
            grading_session(leaf_category("GRAMMAR_ERROR_EXAM"), full_pool(), Some(config));

        let processor = GrammarErrorExam::new(ctx);
        let result = processor.process_answer(&session, "51234").await.unwrap();
        assert!(result.is_correct);

        let entries = log.take();
        assert_eq!(entries.len(), EXAM_TOTAL);
        assert!(entries.iter().all(|e| e.is_correct));
        assert!(entries.iter().all(|e| e.batch_id == entries[0].batch_id));

        // The same digits in sorted order place every letter wrong.
        let result = processor.process_answer(&session, "12345").await.unwrap();
        assert!(!result.is_correct);
    }
}
