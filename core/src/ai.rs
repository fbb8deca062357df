//! Prompt construction, provider response types and normalization for AI
//! meal suggestions.
//!
//! The HTTP side lives in the binary; everything here is pure so it can be
//! exercised without network access.

use anyhow::{Context, Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AiMealResult, MacroNeeds, calories_from_macros, normalize_meal_type};

pub const SYSTEM_PROMPT: &str = "You are a professional chef and nutritionist. \
You design realistic, healthy meals and estimate their macronutrients accurately.";

const RESPONSE_FORMAT_HINT: &str = "Respond with a single JSON object and nothing else, \
using exactly these fields: \"name\" (string), \"description\" (string), \
\"ingredients\" (array of strings), \"protein\", \"carbs\", \"fat\" (grams, numbers), \
\"calories\" (kcal, number) and \"mealType\" (one of breakfast, lunch, dinner, snack).";

#[must_use]
pub fn build_meal_prompt(prompt: &str, needs: Option<&MacroNeeds>) -> String {
    let mut text = format!("Create a meal based on this request: {}\n", prompt.trim());
    if let Some(n) = needs {
        text.push_str(&format!(
            "Target macros: {:.0}g protein, {:.0}g carbs, {:.0}g fat.\n",
            n.protein, n.carbs, n.fat
        ));
    }
    text.push_str(RESPONSE_FORMAT_HINT);
    text
}

/// Gemini gets no separate system turn, so the persona is prepended.
#[must_use]
pub fn build_gemini_prompt(prompt: &str, needs: Option<&MacroNeeds>) -> String {
    format!("{SYSTEM_PROMPT}\n\n{}", build_meal_prompt(prompt, needs))
}

// --- OpenAI chat completions ---

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ChatCompletionRequest {
    #[must_use]
    pub fn meal(model: &str, prompt: &str, needs: Option<&MacroNeeds>) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(build_meal_prompt(prompt, needs)),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatCompletionResponse {
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

// --- Gemini generateContent ---

#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateContentRequest {
    #[must_use]
    pub fn meal(prompt: &str, needs: Option<&MacroNeeds>) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(build_gemini_prompt(prompt, needs)),
                }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    pub error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiError {
    pub message: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    #[must_use]
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

// --- Normalization ---

/// The slice from the first `{` to the last `}`, if any.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMealResult {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    ingredients: Option<Value>,
    #[serde(default)]
    protein: Option<Value>,
    #[serde(default)]
    carbs: Option<Value>,
    #[serde(default)]
    fat: Option<Value>,
    #[serde(default)]
    calories: Option<Value>,
    #[serde(default, alias = "meal_type")]
    meal_type: Option<String>,
}

// Accepts 30, 30.5, "30", "30g", " 30.5 g ".
fn number_from_value(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            let end = s
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(s.len());
            s[..end].parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}

fn ingredients_from_value(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse free-form provider output into a normalized meal.
pub fn parse_meal_result(text: &str) -> Result<AiMealResult> {
    let json = extract_json_object(text).context("No JSON object in model output")?;
    let raw: RawMealResult =
        serde_json::from_str(json).context("Model output is not a valid meal object")?;

    let name = raw.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        bail!("Model output has no meal name");
    }

    let protein = number_from_value(raw.protein.as_ref());
    let carbs = number_from_value(raw.carbs.as_ref());
    let fat = number_from_value(raw.fat.as_ref());
    let mut calories = number_from_value(raw.calories.as_ref());
    if calories <= 0.0 {
        calories = calories_from_macros(protein, carbs, fat);
    }

    Ok(AiMealResult {
        name: name.to_string(),
        description: raw.description.unwrap_or_default().trim().to_string(),
        ingredients: ingredients_from_value(raw.ingredients),
        protein,
        carbs,
        fat,
        calories,
        meal_type: normalize_meal_type(raw.meal_type.as_deref().unwrap_or_default()),
    })
}

// --- Canned fallback ---

struct CannedTemplate {
    name: &'static str,
    description: &'static str,
    ingredients: &'static [&'static str],
    meal_type: &'static str,
}

const SALAD: CannedTemplate = CannedTemplate {
    name: "Mediterranean salad",
    description: "Crisp greens with tomato, cucumber, olives and feta, dressed with lemon.",
    ingredients: &[
        "Mixed greens",
        "Cherry tomatoes",
        "Cucumber",
        "Kalamata olives",
        "Feta cheese",
        "Olive oil",
        "Lemon juice",
    ],
    meal_type: "lunch",
};

const CHICKEN: CannedTemplate = CannedTemplate {
    name: "Grilled chicken with vegetables",
    description: "Herb-marinated chicken breast served with roasted seasonal vegetables.",
    ingredients: &[
        "Chicken breast",
        "Zucchini",
        "Bell pepper",
        "Red onion",
        "Olive oil",
        "Garlic",
        "Fresh herbs",
    ],
    meal_type: "dinner",
};

const BREAKFAST: CannedTemplate = CannedTemplate {
    name: "Avocado toast with egg",
    description: "Whole-grain toast topped with smashed avocado and a poached egg.",
    ingredients: &[
        "Whole-grain bread",
        "Avocado",
        "Egg",
        "Cherry tomatoes",
        "Chili flakes",
    ],
    meal_type: "breakfast",
};

const GENERIC: CannedTemplate = CannedTemplate {
    name: "Balanced protein bowl",
    description: "Brown rice with lean protein, steamed greens and a light sesame dressing.",
    ingredients: &[
        "Brown rice",
        "Lean protein",
        "Broccoli",
        "Spinach",
        "Sesame dressing",
    ],
    meal_type: "lunch",
};

fn template_for(prompt: &str) -> &'static CannedTemplate {
    let p = prompt.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| p.contains(w));
    if has(&["salad", "ensalada"]) {
        &SALAD
    } else if has(&["chicken", "pollo"]) {
        &CHICKEN
    } else if has(&["breakfast", "desayuno"]) {
        &BREAKFAST
    } else {
        &GENERIC
    }
}

/// Placeholder meal used when every provider fails. Requested macros are used
/// as given, zeros included. Without them the macros are drawn at random.
pub fn canned_meal<R: Rng>(
    prompt: &str,
    needs: Option<&MacroNeeds>,
    rng: &mut R,
) -> AiMealResult {
    let (protein, carbs, fat) = match needs {
        Some(n) => (n.protein, n.carbs, n.fat),
        None => (
            f64::from(rng.random_range(20..50)),
            f64::from(rng.random_range(30..70)),
            f64::from(rng.random_range(10..25)),
        ),
    };
    let template = template_for(prompt);

    AiMealResult {
        name: template.name.to_string(),
        description: template.description.to_string(),
        ingredients: template.ingredients.iter().map(|s| (*s).to_string()).collect(),
        protein,
        carbs,
        fat,
        calories: calories_from_macros(protein, carbs, fat),
        meal_type: template.meal_type.to_string(),
    }
}
