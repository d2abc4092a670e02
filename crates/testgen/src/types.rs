use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Test categories, ordered roughly from "can't be gamed" to "ties it all
/// together". The generator walks them in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    AntiCheat,
    Existence,
    Format,
    HappyPath,
    Boundary,
    EdgeCase,
    InvalidInput,
    Integration,
    Correctness,
}

impl TestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AntiCheat => "anti_cheat",
            Self::Existence => "existence",
            Self::Format => "format",
            Self::HappyPath => "happy_path",
            Self::Boundary => "boundary",
            Self::EdgeCase => "edge_case",
            Self::InvalidInput => "invalid_input",
            Self::Integration => "integration",
            Self::Correctness => "correctness",
        }
    }

    /// Human label used in generated pytest section banners.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AntiCheat => "Anti-Cheat",
            Self::Existence => "Existence",
            Self::Format => "Format",
            Self::HappyPath => "Happy Path",
            Self::Boundary => "Boundary",
            Self::EdgeCase => "Edge Case",
            Self::InvalidInput => "Invalid Input",
            Self::Integration => "Integration",
            Self::Correctness => "Correctness",
        }
    }

    /// Ideal share of the final suite, used by the balance score.
    pub fn ideal_share(&self) -> f64 {
        match self {
            Self::Existence => 0.05,
            Self::Format => 0.10,
            Self::HappyPath => 0.25,
            Self::Boundary => 0.20,
            Self::EdgeCase => 0.25,
            Self::InvalidInput => 0.10,
            Self::Integration => 0.05,
            // Not part of the ideal distribution table.
            Self::AntiCheat | Self::Correctness => 0.0,
        }
    }

    /// Default generation order.
    pub fn default_order() -> Vec<TestCategory> {
        vec![
            Self::AntiCheat,
            Self::Existence,
            Self::Format,
            Self::HappyPath,
            Self::Boundary,
            Self::EdgeCase,
            Self::InvalidInput,
            Self::Integration,
        ]
    }
}

/// A single generated verification test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub id: String,
    /// The input handed to the solution under test
    pub input: String,
    /// Expected output; `None` asserts "no output / no match"
    #[serde(rename = "expectedOutput")]
    pub expected_output: Option<String>,
    /// Why this test matters
    pub reasoning: String,
    pub category: TestCategory,
    /// Generator confidence in [0, 1]
    pub confidence: f64,
}

/// Weights behind the comprehensiveness score. Stored alongside the config
/// so evolution can tune them rather than bake them into code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(rename = "categoryCount")]
    pub category_count: f64,
    #[serde(rename = "antiCheatCoverage")]
    pub anti_cheat_coverage: f64,
    #[serde(rename = "parameterDiscovery")]
    pub parameter_discovery: f64,
    #[serde(rename = "balanceDeviation")]
    pub balance_deviation: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            category_count: 3.0,
            anti_cheat_coverage: 2.0,
            parameter_discovery: 1.0,
            balance_deviation: 2.0,
        }
    }
}

/// Tunable generation settings; the hashed identity of this tuple
/// deduplicates configs in the evolution store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenConfigInput {
    /// Categories in generation order
    pub categories: Vec<TestCategory>,
    #[serde(rename = "maxRoundsPerCategory")]
    pub max_rounds_per_category: u32,
    /// Soft target for overall suite size
    #[serde(rename = "targetTestCount")]
    pub target_test_count: u32,
    pub temperature: f64,
    pub weights: ScoreWeights,
}

impl Default for TestGenConfigInput {
    fn default() -> Self {
        Self {
            categories: TestCategory::default_order(),
            max_rounds_per_category: 3,
            target_test_count: 20,
            temperature: 0.7,
            weights: ScoreWeights::default(),
        }
    }
}

impl TestGenConfigInput {
    /// Stable fingerprint over the exact configuration tuple.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"testgen-config-v1");
        for category in &self.categories {
            hasher.update(category.as_str().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(self.max_rounds_per_category.to_le_bytes());
        hasher.update(self.target_test_count.to_le_bytes());
        hasher.update(self.temperature.to_le_bytes());
        hasher.update(self.weights.category_count.to_le_bytes());
        hasher.update(self.weights.anti_cheat_coverage.to_le_bytes());
        hasher.update(self.weights.parameter_discovery.to_le_bytes());
        hasher.update(self.weights.balance_deviation.to_le_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

/// A stored config row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenConfig {
    pub id: i64,
    pub config_hash: String,
    #[serde(flatten)]
    pub input: TestGenConfigInput,
    pub created_at: String,
}

/// One completed generation run, as stored for evolution tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenRunInput {
    pub run_id: String,
    pub session_id: String,
    pub config_id: i64,
    pub task_id: String,
    pub total_tests: u32,
    pub comprehensiveness_score: Option<f64>,
    pub duration_ms: u64,
    pub total_tokens: u64,
    pub category_balance: Option<f64>,
    pub anti_cheat_coverage: Option<f64>,
    pub parameter_discovery: Option<f64>,
    pub reflection_effectiveness: Option<f64>,
    pub token_efficiency: Option<f64>,
    pub meta_model: Option<String>,
    pub proposed_change: Option<String>,
    pub change_accepted: bool,
    pub score: i64,
}

/// A stored run row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestGenRun {
    pub id: i64,
    #[serde(flatten)]
    pub input: TestGenRunInput,
    pub created_at: String,
}
