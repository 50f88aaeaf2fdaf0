use indexmap::IndexMap;

use super::{CompiledHotword, EngineError, HotwordEmbedding};

/// Weight given to phrases listed without one
pub(crate) const DEFAULT_WEIGHT: f32 = 20.0;

/// Parse a hotword list into single-weight vectors
///
/// Accepts a JSON object of `{"phrase": weight}` pairs, or plain text where
/// each line is either `phrase weight` or whitespace-separated phrases with
/// the default weight. Later duplicates replace earlier ones.
pub(crate) fn parse(text: &str) -> Result<HotwordEmbedding, EngineError> {
    let trimmed = text.trim();

    let weights = if trimmed.starts_with('{') {
        parse_json(trimmed)?
    } else {
        parse_lines(trimmed)?
    };

    HotwordEmbedding::new(
        weights
            .into_iter()
            .map(|(phrase, weight)| CompiledHotword {
                phrase,
                vector: vec![weight],
            })
            .collect(),
    )
}

fn parse_json(text: &str) -> Result<IndexMap<String, f32>, EngineError> {
    let raw: IndexMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| EngineError::Hotwords(format!("invalid hotword object: {e}")))?;

    let mut weights = IndexMap::with_capacity(raw.len());

    for (phrase, value) in raw {
        let weight = match &value {
            serde_json::Value::Number(number) => number.as_f64(),
            serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };

        #[allow(clippy::cast_possible_truncation)]
        let weight = checked_weight(&phrase, weight.map(|w| w as f32))?;
        let phrase = phrase.trim();
        if !phrase.is_empty() {
            weights.insert(phrase.to_string(), weight);
        }
    }

    Ok(weights)
}

fn parse_lines(text: &str) -> Result<IndexMap<String, f32>, EngineError> {
    let mut weights = IndexMap::new();

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let Some((last, head)) = tokens.split_last() else {
            continue;
        };

        if !head.is_empty() && looks_numeric(last) {
            let weight = checked_weight(line, last.parse::<f32>().ok())?;
            weights.insert(head.join(" "), weight);
        } else {
            for phrase in tokens {
                weights.insert(phrase.to_string(), DEFAULT_WEIGHT);
            }
        }
    }

    Ok(weights)
}

fn looks_numeric(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        && token.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

fn checked_weight(context: &str, weight: Option<f32>) -> Result<f32, EngineError> {
    match weight {
        Some(weight) if weight.is_finite() && weight > 0.0 => Ok(weight),
        _ => Err(EngineError::Hotwords(format!("invalid weight for '{context}'"))),
    }
}
