use shared::domain::{Question, QuestionResponse, ResponseKind, Survey, SurveyResponse};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("no answers given")]
    Empty,
    #[error("expected {expected} answers, got {found}")]
    TooFew { expected: usize, found: usize },
    #[error("numeric input required for {question}")]
    NotNumeric { question: String },
}

/// Parses one comma separated batch of answers, one segment per question in
/// survey order. Extra segments are ignored. Any bad segment rejects the
/// whole batch.
pub fn parse_answers(survey: &Survey, input: &str) -> Result<Vec<QuestionResponse>, AnswerError> {
    if input.trim().is_empty() {
        return Err(AnswerError::Empty);
    }
    let segments: Vec<&str> = input.split(',').map(str::trim).collect();
    if segments.len() < survey.questions.len() {
        return Err(AnswerError::TooFew {
            expected: survey.questions.len(),
            found: segments.len(),
        });
    }

    survey
        .questions
        .iter()
        .zip(segments)
        .map(|(question, segment)| parse_answer(question, segment))
        .collect()
}

fn parse_answer(question: &Question, segment: &str) -> Result<QuestionResponse, AnswerError> {
    let numeric_value = match question.response_kind {
        ResponseKind::Text => None,
        ResponseKind::Number if segment.eq_ignore_ascii_case("u") => None,
        ResponseKind::Number => match segment.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                return Err(AnswerError::NotNumeric {
                    question: question.summary_text.clone(),
                })
            }
        },
    };
    Ok(QuestionResponse {
        question_id: question.id,
        raw_text: segment.to_string(),
        numeric_value,
    })
}

/// Pairs stored answers with the survey's questions by question id. Returns
/// `None` unless every question has exactly one answer and nothing is left
/// over.
pub fn pair_answers<'a>(
    survey: &'a Survey,
    response: &'a SurveyResponse,
) -> Option<Vec<(&'a Question, &'a QuestionResponse)>> {
    if response.responses.len() != survey.questions.len() {
        return None;
    }
    survey
        .questions
        .iter()
        .map(|question| {
            let mut matching = response
                .responses
                .iter()
                .filter(|answer| answer.question_id == question.id);
            match (matching.next(), matching.next()) {
                (Some(answer), None) => Some((question, answer)),
                _ => None,
            }
        })
        .collect()
}

/// One `Summary: value` line per question.
pub fn render_answers(
    pairs: &[(&Question, &QuestionResponse)],
    unknown_label: &str,
) -> String {
    pairs
        .iter()
        .map(|(question, answer)| {
            let value = match question.response_kind {
                ResponseKind::Number => answer
                    .numeric_value
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| unknown_label.to_string()),
                ResponseKind::Text => answer.raw_text.clone(),
            };
            format!("{}: {value}", question.summary_text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "tests/answers_tests.rs"]
mod tests;
