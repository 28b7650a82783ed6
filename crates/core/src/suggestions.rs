//! Prescription-suggestion providers, prompts and response parsing.
//!
//! The HTTP calls live in `retina-inference`; this module owns everything
//! that can be decided without I/O: which providers exist and where they
//! live by default, what we ask them, and how we read their answer.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Supported suggestion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Gemini,
    Perplexity,
    Grok,
    DeepSeek,
    Glm,
    Custom,
}

/// Wire protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    /// `POST {base}/chat/completions` with bearer auth.
    ChatCompletions,
    /// `POST {base}/models/{model}:generateContent?key=...`.
    GenerateContent,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::OpenAi,
        Provider::Gemini,
        Provider::Perplexity,
        Provider::Grok,
        Provider::DeepSeek,
        Provider::Glm,
        Provider::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Perplexity => "perplexity",
            Provider::Grok => "grok",
            Provider::DeepSeek => "deepseek",
            Provider::Glm => "glm",
            Provider::Custom => "custom",
        }
    }

    pub fn parse(name: &str) -> Result<Self, CoreError> {
        let normalized = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unsupported provider '{name}'. Must be one of: openai, gemini, \
                     perplexity, grok, deepseek, glm, custom"
                ))
            })
    }

    /// Base URL used when a setting leaves `base_url` empty. Custom
    /// providers have none.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("https://api.openai.com/v1"),
            Provider::Gemini => Some("https://generativelanguage.googleapis.com/v1"),
            Provider::Perplexity => Some("https://api.perplexity.ai"),
            Provider::Grok => Some("https://api.x.ai/v1"),
            Provider::DeepSeek => Some("https://api.deepseek.com"),
            Provider::Glm => Some("https://open.bigmodel.cn/api/paas/v4"),
            Provider::Custom => None,
        }
    }

    pub fn api_style(self) -> ApiStyle {
        match self {
            Provider::Gemini => ApiStyle::GenerateContent,
            _ => ApiStyle::ChatCompletions,
        }
    }
}

/// A ready-made provider/model combination offered in the settings UI.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTemplate {
    pub provider_name: &'static str,
    pub base_url: &'static str,
    pub model_name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub fn templates() -> Vec<ModelTemplate> {
    const fn t(
        provider_name: &'static str,
        base_url: &'static str,
        model_name: &'static str,
        display_name: &'static str,
        description: &'static str,
    ) -> ModelTemplate {
        ModelTemplate {
            provider_name,
            base_url,
            model_name,
            display_name,
            description,
        }
    }

    vec![
        t("openai", "https://api.openai.com/v1", "gpt-4", "OpenAI GPT-4", "Most capable GPT-4 model"),
        t("openai", "https://api.openai.com/v1", "gpt-3.5-turbo", "OpenAI GPT-3.5 Turbo", "Fast and cost-effective model"),
        t("gemini", "https://generativelanguage.googleapis.com/v1", "gemini-1.5-pro", "Google Gemini 1.5 Pro", "Google Gemini 1.5 Pro model"),
        t("gemini", "https://generativelanguage.googleapis.com/v1", "gemini-1.5-flash", "Google Gemini 1.5 Flash", "Google Gemini 1.5 Flash model"),
        t("perplexity", "https://api.perplexity.ai", "sonar-medium-chat", "Perplexity Sonar Medium Chat", "Perplexity Sonar Medium Chat model"),
        t("perplexity", "https://api.perplexity.ai", "sonar-small-chat", "Perplexity Sonar Small Chat", "Perplexity Sonar Small Chat model"),
        t("grok", "https://api.x.ai/v1", "grok-beta", "xAI Grok Beta", "xAI Grok model"),
        t("deepseek", "https://api.deepseek.com", "deepseek-chat", "DeepSeek Chat", "DeepSeek Chat model"),
        t("glm", "https://open.bigmodel.cn/api/paas/v4", "glm-4", "GLM-4", "GLM-4 model"),
    ]
}

// ---------------------------------------------------------------------------
// Prompt building
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInfo {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
}

impl PatientInfo {
    pub fn display_name(&self) -> String {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{first} {last}"),
            (false, true) => first.to_string(),
            (true, false) => last.to_string(),
            (true, true) => "Unknown Patient".to_string(),
        }
    }
}

/// One analysed image as presented to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultLine {
    pub class_name: String,
    pub confidence_percent: f64,
}

/// Everything the provider is told about a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalPayload {
    pub patient_info: PatientInfo,
    #[serde(default)]
    pub results: Vec<ResultLine>,
    #[serde(default)]
    pub conclusion: String,
    pub clinical_notes: Option<String>,
}

/// Appended for providers that have no JSON mode.
pub const STRICT_JSON_SUFFIX: &str = "\n\nCRITICAL: Your response MUST be a COMPLETE, VALID JSON \
object. Do not include any text outside the JSON. Start with { and end with }. Do not use \
markdown code blocks.";

pub fn system_prompt() -> &'static str {
    r#"You are a medical AI assistant specializing in diabetic retinopathy.
Provide structured treatment suggestions and clinical guidance based on retinal analysis results.

Always respond in this exact JSON format and ensure the entire response is complete:
{
    "summary_for_doctor": "Clinical summary for the healthcare provider including patient name, age, gender and the clinical notes",
    "patient_friendly_summary": "Patient-friendly explanation that includes the patient name",
    "treatment_plan": ["Step 1", "Step 2"],
    "medication_suggestions": ["Medication 1", "Medication 2"],
    "lifestyle_recommendations": ["Recommendation 1", "Recommendation 2"],
    "followup_interval": "Follow-up timing recommendation",
    "red_flag_warnings": ["Warning 1", "Warning 2"],
    "disclaimer": "Appropriate medical disclaimer"
}

Instructions:
1. Start "summary_for_doctor" with the patient's name, age and gender.
2. Reference the clinical notes and observations provided.
3. Address the patient by name in "patient_friendly_summary".
4. Personalize every recommendation to the patient's demographics and presentation.
5. Return the complete JSON object with every bracket and quote closed.

Be concise, clinical and evidence-based. Focus on diabetic retinopathy management and treatment."#
}

pub fn user_prompt(payload: &ClinicalPayload) -> String {
    let name = payload.patient_info.display_name();
    let age = payload
        .patient_info
        .age
        .map_or_else(|| "Not specified".to_string(), |a| a.to_string());
    let gender = payload
        .patient_info
        .gender
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .unwrap_or("Not specified");

    let mut prompt = format!(
        "\nPATIENT DEMOGRAPHICS:\n- Name: {name}\n- Age: {age}\n- Gender: {gender}\n\n\
         DIABETIC RETINOPATHY ANALYSIS RESULTS:\n"
    );
    for (i, result) in payload.results.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "- Image {}: {} (Confidence: {:.1}%)",
            i + 1,
            result.class_name,
            result.confidence_percent
        );
    }

    let notes = payload
        .clinical_notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("No additional clinical observations or current medications provided");

    let _ = write!(
        prompt,
        "\nCLINICAL CONCLUSION FROM ANALYSIS:\n{conclusion}\n\n\
         CLINICAL OBSERVATIONS & CURRENT MEDICATIONS:\n{notes}\n\n\
         Consider standard diabetic retinopathy protocols: anti-VEGF agents (ranibizumab, \
         aflibercept, bevacizumab), corticosteroids (dexamethasone, triamcinolone), laser \
         treatment (panretinal photocoagulation, focal laser), systemic glycaemic, blood \
         pressure and lipid management.\n\n\
         Based on this information for {name}, provide structured treatment suggestions \
         specific to this {age} year old {gender} patient.\n",
        conclusion = payload.conclusion,
    );
    prompt
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Structured answer returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionSuggestions {
    pub summary_for_doctor: String,
    pub patient_friendly_summary: String,
    pub treatment_plan: Vec<String>,
    pub medication_suggestions: Vec<String>,
    pub lifestyle_recommendations: Vec<String>,
    pub followup_interval: String,
    pub red_flag_warnings: Vec<String>,
    pub disclaimer: String,
    /// The provider's answer could not be parsed as a whole.
    pub partial: bool,
}

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?\s*").expect("valid regex"));
static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""summary_for_doctor"\s*:\s*"([^"]*)"#).expect("valid regex")
});
static PATIENT_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""patient_friendly_summary"\s*:\s*"([^"]*)"#).expect("valid regex")
});
static TREATMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"treatment_plan"\s*:\s*\[(.*?)(?:\]|$)"#).expect("valid regex")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*?)""#).expect("valid regex"));

/// Parse a provider answer, tolerating code fences, surrounding prose and
/// missing fields. Falls back to regex extraction for truncated JSON.
pub fn parse_response(content: &str) -> PrescriptionSuggestions {
    let cleaned = CODE_FENCE_RE.replace_all(content, "");
    let json_slice = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned.as_ref(),
    };

    match serde_json::from_str::<Value>(json_slice) {
        Ok(Value::Object(map)) => {
            let text = |key: &str, default: &str| {
                map.get(key)
                    .and_then(Value::as_str)
                    .map_or_else(|| default.to_string(), str::to_string)
            };
            let list = |key: &str| string_list(map.get(key));
            let treatment_plan = match map.get("treatment_plan") {
                Some(v) => string_list(Some(v)),
                None => vec!["Information for treatment_plan was not generated.".to_string()],
            };

            PrescriptionSuggestions {
                summary_for_doctor: text(
                    "summary_for_doctor",
                    "Information for summary_for_doctor was not generated.",
                ),
                patient_friendly_summary: text(
                    "patient_friendly_summary",
                    "Information for patient_friendly_summary was not generated.",
                ),
                treatment_plan,
                medication_suggestions: list("medication_suggestions"),
                lifestyle_recommendations: list("lifestyle_recommendations"),
                followup_interval: text("followup_interval", "Refer to ophthalmologist"),
                red_flag_warnings: list("red_flag_warnings"),
                disclaimer: text("disclaimer", "AI-generated. Consult a professional."),
                partial: false,
            }
        }
        _ => extract_partial(content),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn extract_partial(content: &str) -> PrescriptionSuggestions {
    let capture = |re: &Regex| {
        re.captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let treatment_plan = match TREATMENT_RE.captures(content).and_then(|c| c.get(1)) {
        Some(body) => {
            let items: Vec<String> = QUOTED_RE
                .captures_iter(body.as_str())
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect();
            if items.is_empty() {
                vec!["Treatment plan not fully available in truncated response".to_string()]
            } else {
                items
            }
        }
        None => vec!["Treatment plan not available in truncated response".to_string()],
    };

    PrescriptionSuggestions {
        summary_for_doctor: capture(&SUMMARY_RE)
            .unwrap_or_else(|| "Partial summary extracted from truncated response".to_string()),
        patient_friendly_summary: capture(&PATIENT_SUMMARY_RE).unwrap_or_else(|| {
            "Patient-friendly summary not available in truncated response".to_string()
        }),
        treatment_plan,
        medication_suggestions: Vec::new(),
        lifestyle_recommendations: Vec::new(),
        followup_interval: "Unable to determine from truncated response".to_string(),
        red_flag_warnings: Vec::new(),
        disclaimer: "This response was truncated and may be incomplete.".to_string(),
        partial: true,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn payload() -> ClinicalPayload {
        ClinicalPayload {
            patient_info: PatientInfo {
                first_name: "Asha".into(),
                last_name: "Rao".into(),
                age: Some(54),
                gender: Some("Female".into()),
            },
            results: vec![
                ResultLine {
                    class_name: "Moderate".into(),
                    confidence_percent: 87.456,
                },
                ResultLine {
                    class_name: "Mild".into(),
                    confidence_percent: 61.0,
                },
            ],
            conclusion: "Moderate DR detected.".into(),
            clinical_notes: None,
        }
    }

    #[test]
    fn provider_names() {
        assert_eq!(Provider::parse("OpenAI").unwrap(), Provider::OpenAi);
        assert_eq!(Provider::parse("deepseek").unwrap(), Provider::DeepSeek);
        assert_matches!(Provider::parse("anthropic"), Err(CoreError::Validation(_)));
        assert_eq!(Provider::Custom.default_base_url(), None);
        assert_eq!(Provider::Gemini.api_style(), ApiStyle::GenerateContent);
        assert_eq!(Provider::Glm.api_style(), ApiStyle::ChatCompletions);
    }

    #[test]
    fn templates_reference_known_providers() {
        for t in templates() {
            let provider = Provider::parse(t.provider_name).unwrap();
            assert_eq!(provider.default_base_url(), Some(t.base_url));
        }
    }

    #[test]
    fn user_prompt_lists_each_image() {
        let prompt = user_prompt(&payload());
        assert!(prompt.contains("- Name: Asha Rao"));
        assert!(prompt.contains("- Image 1: Moderate (Confidence: 87.5%)"));
        assert!(prompt.contains("- Image 2: Mild (Confidence: 61.0%)"));
        assert!(prompt.contains("No additional clinical observations"));
    }

    #[test]
    fn unknown_patient_name() {
        assert_eq!(PatientInfo::default().display_name(), "Unknown Patient");
    }

    #[test]
    fn parses_fenced_json_with_prose() {
        let content = "Here you go:\n```json\n{\"summary_for_doctor\": \"Asha, 54, F\", \
                       \"patient_friendly_summary\": \"Hi Asha\", \"treatment_plan\": [\"Anti-VEGF\"], \
                       \"followup_interval\": \"3 months\"}\n```\nThanks";
        let parsed = parse_response(content);
        assert!(!parsed.partial);
        assert_eq!(parsed.summary_for_doctor, "Asha, 54, F");
        assert_eq!(parsed.treatment_plan, vec!["Anti-VEGF"]);
        assert_eq!(parsed.followup_interval, "3 months");
        assert!(parsed.medication_suggestions.is_empty());
        assert_eq!(parsed.disclaimer, "AI-generated. Consult a professional.");
    }

    #[test]
    fn missing_required_fields_get_placeholders() {
        let parsed = parse_response("{}");
        assert_eq!(
            parsed.summary_for_doctor,
            "Information for summary_for_doctor was not generated."
        );
        assert_eq!(parsed.treatment_plan.len(), 1);
    }

    #[test]
    fn truncated_json_falls_back_to_partial_extraction() {
        let content = r#"{"summary_for_doctor": "Asha has moderate DR", "patient_friendly_summary": "Your eyes", "treatment_plan": ["Laser", "Recheck"#;
        let parsed = parse_response(content);
        assert!(parsed.partial);
        assert_eq!(parsed.summary_for_doctor, "Asha has moderate DR");
        assert_eq!(parsed.patient_friendly_summary, "Your eyes");
        assert_eq!(parsed.treatment_plan, vec!["Laser"]);
    }
}
