//! Data Describer: a short analyst-style summary of a result preview.

use sqlsage_core::TextGenerator;

pub const EMPTY_DATASET_MESSAGE: &str = "The dataset is empty. Please provide a valid dataset.";

const PREVIEW_ROWS: usize = 5;

/// Right-aligned text preview of the header plus the first few rows.
pub fn render_preview(headers: &[String], rows: &[Vec<String>]) -> String {
    let rows = &rows[..rows.len().min(PREVIEW_ROWS)];
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = vec![pad_line(headers, &widths)];
    for row in rows {
        out.push(pad_line(row, &widths));
    }
    out.join("\n")
}

fn pad_line(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:>width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn describe_prompt(preview: &str) -> String {
    format!(
        "You are a data analyst. Analyze the following dataset and provide a brief description:

Dataset Preview:
{preview}

Include details about:
1. The type of data (e.g., sales, customer, product, etc.).
2. Key columns and their significance.
3. Any patterns or insights you can infer from the preview."
    )
}

/// Describe a result table. Failures are returned as text, never as errors.
pub async fn describe(generator: &dyn TextGenerator, headers: &[String], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return EMPTY_DATASET_MESSAGE.to_string();
    }

    let prompt = describe_prompt(&render_preview(headers, rows));
    match generator.generate(&prompt).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Data description failed");
            format!("Error generating description: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlsage_core::GenerationError;
    use std::sync::Mutex;

    struct Recording {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok("  Sales data by customer.  ".to_string())
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_preview_is_aligned_and_truncated() {
        let headers = strings(&["name", "total_amount"]);
        let rows: Vec<Vec<String>> = (0..8).map(|i| strings(&[format!("c{}", i).as_str(), "$1.00"])).collect();
        let preview = render_preview(&headers, &rows);

        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 1 + PREVIEW_ROWS);
        assert_eq!(lines[0], "name total_amount");
        assert_eq!(lines[1], format!("{:>4} {:>12}", "c0", "$1.00"));
    }

    #[tokio::test]
    async fn test_empty_dataset_skips_model() {
        let generator = Recording {
            prompts: Mutex::new(vec![]),
            fail: false,
        };
        let text = describe(&generator, &strings(&["n"]), &[]).await;
        assert_eq!(text, EMPTY_DATASET_MESSAGE);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_description_is_trimmed_model_text() {
        let generator = Recording {
            prompts: Mutex::new(vec![]),
            fail: false,
        };
        let text = describe(&generator, &strings(&["n"]), &[strings(&["1"])]).await;
        assert_eq!(text, "Sales data by customer.");
        assert!(generator.prompts.lock().unwrap()[0].contains("Dataset Preview:"));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_text() {
        let generator = Recording {
            prompts: Mutex::new(vec![]),
            fail: true,
        };
        let text = describe(&generator, &strings(&["n"]), &[strings(&["1"])]).await;
        assert!(text.starts_with("Error generating description:"), "{}", text);
    }
}
