use serde_json::Value;

use crate::error::AppError;

/// One displayed nutrition field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Nothing to show yet, or the last analysis failed.
    Unset,
    /// The service answered but left this field out.
    NotAvailable,
    Value(f64),
}

impl FieldValue {
    pub fn display(&self, unit: &str) -> String {
        match self {
            FieldValue::Unset => "--".to_string(),
            FieldValue::NotAvailable => "N/A".to_string(),
            FieldValue::Value(v) => format!("{:.2} {}", v, unit),
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => FieldValue::Value(v),
            None => FieldValue::NotAvailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NutritionEstimate {
    pub calories: Option<f64>,
    pub carbohydrates: Option<f64>,
    pub proteins: Option<f64>,
}

/// Pull the estimate out of a `generateContent` response body.
///
/// The service is asked for JSON output, so the first part's text must itself be a
/// JSON object. Absent or null fields become `None`; any other non-number fails
/// the whole estimate.
pub fn parse_generate_response(response: &Value) -> Result<NutritionEstimate, AppError> {
    let text = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::MalformedResponse("response has no candidate text".to_string())
        })?;

    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| AppError::MalformedResponse(format!("candidate text is not JSON: {}", e)))?;
    let object = parsed.as_object().ok_or_else(|| {
        AppError::MalformedResponse("candidate text is not a JSON object".to_string())
    })?;

    let field = |name: &str| -> Result<Option<f64>, AppError> {
        match object.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                AppError::MalformedResponse(format!("{} is not a number: {}", name, value))
            }),
        }
    };

    Ok(NutritionEstimate {
        calories: field("calories")?,
        carbohydrates: field("carbohydrates")?,
        proteins: field("proteins")?,
    })
}

/// What the results area currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPanel {
    pub visible: bool,
    pub calories: FieldValue,
    pub carbohydrates: FieldValue,
    pub proteins: FieldValue,
}

impl Default for ResultPanel {
    fn default() -> Self {
        Self {
            visible: false,
            calories: FieldValue::Unset,
            carbohydrates: FieldValue::Unset,
            proteins: FieldValue::Unset,
        }
    }
}

impl ResultPanel {
    pub fn show_estimate(&mut self, estimate: &NutritionEstimate) {
        self.calories = estimate.calories.into();
        self.carbohydrates = estimate.carbohydrates.into();
        self.proteins = estimate.proteins.into();
        self.visible = true;
    }

    /// All fields back to the placeholder, panel still shown.
    pub fn show_unavailable(&mut self) {
        self.calories = FieldValue::Unset;
        self.carbohydrates = FieldValue::Unset;
        self.proteins = FieldValue::Unset;
        self.visible = true;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn calories_text(&self) -> String {
        self.calories.display("kcal")
    }

    pub fn carbohydrates_text(&self) -> String {
        self.carbohydrates.display("g")
    }

    pub fn proteins_text(&self) -> String {
        self.proteins.display("g")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with_text(text: &str) -> Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn test_parse_full_estimate() {
        let response = response_with_text(r#"{"calories":250,"carbohydrates":30,"proteins":10}"#);
        let estimate = parse_generate_response(&response).unwrap();
        assert_eq!(estimate.calories, Some(250.0));
        assert_eq!(estimate.carbohydrates, Some(30.0));
        assert_eq!(estimate.proteins, Some(10.0));
    }

    #[test]
    fn test_missing_fields_are_not_available() {
        let response = response_with_text(r#"{"calories":120.5,"proteins":null}"#);
        let estimate = parse_generate_response(&response).unwrap();

        let mut panel = ResultPanel::default();
        panel.show_estimate(&estimate);
        assert!(panel.visible);
        assert_eq!(panel.calories_text(), "120.50 kcal");
        assert_eq!(panel.carbohydrates_text(), "N/A");
        assert_eq!(panel.proteins_text(), "N/A");
    }

    #[test]
    fn test_empty_candidates_is_malformed() {
        let result = parse_generate_response(&json!({ "candidates": [] }));
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn test_missing_parts_is_malformed() {
        let result = parse_generate_response(&json!({ "candidates": [{ "content": {} }] }));
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn test_non_json_text_is_malformed() {
        let result = parse_generate_response(&response_with_text("I think it's a salad"));
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn test_string_field_is_malformed() {
        let result = parse_generate_response(&response_with_text(r#"{"calories":"lots"}"#));
        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
    }

    #[test]
    fn test_unavailable_and_clear() {
        let mut panel = ResultPanel::default();
        panel.show_unavailable();
        assert!(panel.visible);
        assert_eq!(panel.calories_text(), "--");
        assert_eq!(panel.carbohydrates_text(), "--");
        assert_eq!(panel.proteins_text(), "--");

        panel.clear();
        assert_eq!(panel, ResultPanel::default());
        assert!(!panel.visible);
    }
}
