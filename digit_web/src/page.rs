use crate::form::{FormError, IMAGE_FIELD};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Success,
    Warning,
    Error,
}

impl MessageLevel {
    fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Success => "success",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionView {
    pub predicted_class: i64,
    pub confidence: f64,
    pub image_url: String,
}

/// Everything the upload page can show besides the form itself.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub messages: Vec<(MessageLevel, String)>,
    pub form_error: Option<FormError>,
    pub prediction: Option<PredictionView>,
    pub url_message: Option<String>,
}

impl Page {
    pub fn new(url_message: Option<String>) -> Self {
        Self {
            url_message: url_message.filter(|message| !message.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, level: MessageLevel, message: impl Into<String>) -> Self {
        self.messages.push((level, message.into()));
        self
    }

    pub fn with_form_error(mut self, error: FormError) -> Self {
        self.form_error = Some(error);
        self
    }

    pub fn with_prediction(mut self, prediction: PredictionView) -> Self {
        self.prediction = Some(prediction);
        self
    }

    pub fn render(&self) -> String {
        let mut body = String::new();

        for (level, message) in &self.messages {
            let _ = writeln!(
                body,
                r#"<li class="message {}">{}</li>"#,
                level.as_str(),
                escape_html(message)
            );
        }
        if !body.is_empty() {
            body = format!("<ul class=\"messages\">\n{}</ul>\n", body);
        }

        if let Some(url_message) = &self.url_message {
            let _ = writeln!(
                body,
                r#"<p class="url-message">Message from URL: {}</p>"#,
                escape_html(url_message)
            );
        }

        let field_error = self
            .form_error
            .as_ref()
            .map(|e| format!(r#"<ul class="errorlist"><li>{}</li></ul>"#, escape_html(&e.to_string())))
            .unwrap_or_default();

        let _ = write!(
            body,
            r#"<form method="post" action="/" enctype="multipart/form-data">
  {field_error}
  <label for="id_{field}">Image:</label>
  <input type="file" name="{field}" id="id_{field}" accept="image/*" required>
  <button type="submit">Predict</button>
</form>
"#,
            field = IMAGE_FIELD,
        );

        if let Some(prediction) = &self.prediction {
            let _ = write!(
                body,
                r#"<section class="result">
  <h2>Result</h2>
  <p>Predicted digit: <strong>{}</strong></p>
  <p>Confidence: {:.2}%</p>
  <img src="{}" alt="Uploaded image" width="140">
</section>
"#,
                prediction.predicted_class,
                prediction.confidence,
                escape_html(&prediction.image_url)
            );
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Digit recognition</title>
</head>
<body>
<h1>Handwritten digit recognition</h1>
{}</body>
</html>
"#,
            body
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
