use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Closed set of qualitative health labels.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Excellent,
    Good,
    Average,
    Poor,
    Bad,
}

impl Verdict {
    pub const ALL: [Verdict; 5] = [Verdict::Excellent, Verdict::Good, Verdict::Average, Verdict::Poor, Verdict::Bad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Excellent => "Excellent",
            Verdict::Good => "Good",
            Verdict::Average => "Average",
            Verdict::Poor => "Poor",
            Verdict::Bad => "Bad",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Safe, RiskLevel::Moderate, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Additive {
    /// E-number when the label shows one.
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    pub risk_level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeProduct {
    pub product_name: String,
    pub reason: String,
}

/// Structured health assessment of one scanned product.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoodAnalysis {
    pub product_name: String,
    /// Always within 0..=100 once parsed.
    pub health_score: u8,
    pub verdict: Verdict,
    pub summary: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub additives: Vec<Additive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<AlternativeProduct>>,
    pub highlights: Vec<String>,
    pub is_vegetarian: bool,
    pub is_gluten_free: bool,
    pub is_palm_oil_free: bool,
}

impl FoodAnalysis {
    pub fn has_alternatives(&self) -> bool {
        self.alternatives.as_ref().is_some_and(|alts| !alts.is_empty())
    }
}

/// Transport-ready image: base64 payload without any `data:` prefix.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// An analysis as retained by the history store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub analysis: FoodAnalysis,
}

impl HistoryEntry {
    pub fn new(analysis: FoodAnalysis) -> Self {
        Self { id: Uuid::new_v4(), timestamp: Utc::now(), analysis }
    }
}
