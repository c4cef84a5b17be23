//! Configuration for the variational attention unit.
//!
//! [`VariationalConfig`] is fixed at construction: the unit never flips modes
//! between calls. Every behavioural switch is an enum so dispatch happens in a
//! single `match` rather than through scattered flags. Configurations can be
//! built in code or loaded from TOML/JSON files, and a few knobs can be
//! overridden through environment variables for quick experiments.

use std::{
    fmt, fs,
    path::Path,
    str::FromStr,
};

use layers::ActivationKind;
use serde::Deserialize;

use super::errors::AttentionError;

/// Environment variable overriding [`VariationalConfig::n_samples`].
pub const ENV_N_SAMPLES: &str = "VARIATIONAL_ATTENTION_N_SAMPLES";
/// Environment variable overriding [`VariationalConfig::mode`].
pub const ENV_MODE: &str = "VARIATIONAL_ATTENTION_MODE";
/// Environment variable overriding [`VariationalConfig::concentration`].
pub const ENV_CONCENTRATION: &str = "VARIATIONAL_ATTENTION_CONCENTRATION";

/// Family of an attention distribution over source positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistKind {
    /// Dirichlet over the simplex, parameterised by concentrations.
    Dirichlet,
    /// Categorical over source positions, parameterised by probabilities.
    Categorical,
    /// Log-normal alignments. Recognised but not supported.
    LogNormal,
    /// No distribution; sampling is a no-op.
    None,
}

impl DistKind {
    /// Canonical snake-case name.
    pub fn name(&self) -> &'static str {
        match self {
            DistKind::Dirichlet => "dirichlet",
            DistKind::Categorical => "categorical",
            DistKind::LogNormal => "log_normal",
            DistKind::None => "none",
        }
    }
}

impl fmt::Display for DistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the stochastic path builds its context vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttnMode {
    /// Draw `n_samples` alignments from the posterior.
    #[default]
    Sample,
    /// Use every source position as an unweighted pseudo-sample.
    #[serde(alias = "enum")]
    Enumerate,
}

impl FromStr for AttnMode {
    type Err = AttentionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sample" => Ok(AttnMode::Sample),
            "enumerate" | "enum" => Ok(AttnMode::Enumerate),
            other => Err(AttentionError::invalid(format!("unknown mode '{other}'"))),
        }
    }
}

/// Positive map from raw scores to Dirichlet concentrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationFn {
    #[default]
    Softplus,
    Exp,
}

impl ConcentrationFn {
    /// Activation kernel implementing this map.
    pub fn activation(&self) -> ActivationKind {
        match self {
            ConcentrationFn::Softplus => ActivationKind::Softplus,
            ConcentrationFn::Exp => ActivationKind::Exp,
        }
    }
}

impl TryFrom<ActivationKind> for ConcentrationFn {
    type Error = AttentionError;

    fn try_from(kind: ActivationKind) -> Result<Self, Self::Error> {
        match kind {
            ActivationKind::Softplus => Ok(ConcentrationFn::Softplus),
            ActivationKind::Exp => Ok(ConcentrationFn::Exp),
            other => Err(AttentionError::invalid(format!(
                "activation '{}' does not produce positive concentrations",
                other.name()
            ))),
        }
    }
}

/// Compatibility function between queries and source vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Luong "general": `h_s^T W_a h_t` with a learned, bias-free `W_a`.
    #[default]
    General,
    /// Luong "dot": `h_s^T h_t`.
    Dot,
}

/// Support used when drawing Dirichlet samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirichletSupport {
    /// Sample over every source position, then zero padded positions.
    #[default]
    Full,
    /// Sample over each example's valid prefix and zero-pad the remainder.
    Restricted,
}

/// Immutable configuration of a [`VariationalAttention`](crate::VariationalAttention).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariationalConfig {
    /// Feature dimension shared by queries and source vectors.
    pub dim: usize,
    /// Prior (p) distribution computed from scores.
    #[serde(default = "default_dist")]
    pub p_dist_type: DistKind,
    /// Expected posterior (q) distribution supplied by the caller.
    #[serde(default = "default_dist")]
    pub q_dist_type: DistKind,
    /// Sample from the prior instead of the posterior.
    #[serde(default)]
    pub use_prior: bool,
    /// Map from raw scores to Dirichlet concentrations.
    #[serde(default)]
    pub concentration: ConcentrationFn,
    /// Monte-Carlo samples drawn per (batch, target) cell.
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    #[serde(default)]
    pub mode: AttnMode,
    #[serde(default)]
    pub score: ScoreKind,
    #[serde(default)]
    pub dirichlet_support: DirichletSupport,
}

fn default_dist() -> DistKind {
    DistKind::Dirichlet
}

fn default_n_samples() -> usize {
    1
}

impl VariationalConfig {
    /// Dirichlet prior and posterior, one sample, general scores.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            p_dist_type: default_dist(),
            q_dist_type: default_dist(),
            use_prior: false,
            concentration: ConcentrationFn::default(),
            n_samples: default_n_samples(),
            mode: AttnMode::default(),
            score: ScoreKind::default(),
            dirichlet_support: DirichletSupport::default(),
        }
    }

    /// Sets prior and posterior kinds.
    pub fn with_distributions(mut self, p: DistKind, q: DistKind) -> Self {
        self.p_dist_type = p;
        self.q_dist_type = q;
        self
    }

    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn with_mode(mut self, mode: AttnMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_score(mut self, score: ScoreKind) -> Self {
        self.score = score;
        self
    }

    pub fn with_concentration(mut self, concentration: ConcentrationFn) -> Self {
        self.concentration = concentration;
        self
    }

    pub fn with_dirichlet_support(mut self, support: DirichletSupport) -> Self {
        self.dirichlet_support = support;
        self
    }

    pub fn with_use_prior(mut self, use_prior: bool) -> Self {
        self.use_prior = use_prior;
        self
    }

    /// Loads a configuration from a `.toml` or `.json` file and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AttentionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: VariationalConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(AttentionError::Config {
                    message: format!("unsupported configuration extension '{other}'"),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks structural invariants, reporting every violation at once.
    pub fn validate(&self) -> Result<(), AttentionError> {
        let mut errors = Vec::new();

        if self.dim == 0 {
            errors.push("dim must be greater than 0".to_string());
        }
        if self.n_samples == 0 {
            errors.push("n_samples must be greater than 0".to_string());
        }
        if self.p_dist_type == DistKind::None {
            errors.push("p_dist_type must name a distribution".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AttentionError::invalid(errors.join("; ")))
        }
    }

    /// Applies `VARIATIONAL_ATTENTION_*` overrides. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_N_SAMPLES) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.n_samples = n,
                _ => log::warn!("ignoring {ENV_N_SAMPLES}={raw:?}: expected a positive integer"),
            }
        }
        if let Ok(raw) = std::env::var(ENV_MODE) {
            match raw.parse::<AttnMode>() {
                Ok(mode) => self.mode = mode,
                Err(err) => log::warn!("ignoring {ENV_MODE}={raw:?}: {err}"),
            }
        }
        if let Ok(raw) = std::env::var(ENV_CONCENTRATION) {
            let parsed = raw
                .parse::<ActivationKind>()
                .map_err(|err| AttentionError::invalid(err.to_string()))
                .and_then(ConcentrationFn::try_from);
            match parsed {
                Ok(concentration) => self.concentration = concentration,
                Err(err) => log::warn!("ignoring {ENV_CONCENTRATION}={raw:?}: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_defaults() {
        let config: VariationalConfig = toml::from_str(
            r#"
            dim = 8
            p_dist_type = "categorical"
            q_dist_type = "categorical"
            mode = "enum"
            "#,
        )
        .unwrap();
        assert_eq!(config.dim, 8);
        assert_eq!(config.p_dist_type, DistKind::Categorical);
        assert_eq!(config.mode, AttnMode::Enumerate);
        assert_eq!(config.n_samples, 1);
        assert_eq!(config.concentration, ConcentrationFn::Softplus);
        assert_eq!(config.score, ScoreKind::General);
        assert!(!config.use_prior);
    }

    #[test]
    fn json_accepts_log_normal_kind() {
        let config: VariationalConfig =
            serde_json::from_str(r#"{"dim": 4, "p_dist_type": "log_normal", "n_samples": 3}"#)
                .unwrap();
        assert_eq!(config.p_dist_type, DistKind::LogNormal);
        assert_eq!(config.n_samples, 3);
    }

    #[test]
    fn validate_reports_all_violations() {
        let config = VariationalConfig::new(0)
            .with_n_samples(0)
            .with_distributions(DistKind::None, DistKind::Dirichlet);
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("dim"));
        assert!(message.contains("n_samples"));
        assert!(message.contains("p_dist_type"));
        assert!(VariationalConfig::new(4).validate().is_ok());
    }

    #[test]
    fn from_path_rejects_unknown_extension() {
        let dir = std::env::temp_dir().join("variational-attention-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let yaml = dir.join("config.yaml");
        std::fs::write(&yaml, "dim: 4").unwrap();
        assert!(matches!(
            VariationalConfig::from_path(&yaml),
            Err(AttentionError::Config { .. })
        ));

        let toml_path = dir.join("config.toml");
        std::fs::write(&toml_path, "dim = 4\nn_samples = 2\n").unwrap();
        let loaded = VariationalConfig::from_path(&toml_path).unwrap();
        assert_eq!(loaded, VariationalConfig::new(4).with_n_samples(2));
    }

    #[test]
    fn concentration_rejects_non_positive_activations() {
        assert!(ConcentrationFn::try_from(ActivationKind::Tanh).is_err());
        assert_eq!(
            ConcentrationFn::try_from(ActivationKind::Exp).unwrap(),
            ConcentrationFn::Exp
        );
        assert_eq!("Enumerate".parse::<AttnMode>().unwrap(), AttnMode::Enumerate);
    }

    #[test]
    fn env_overrides_skip_bad_values() {
        std::env::set_var(ENV_N_SAMPLES, "7");
        std::env::set_var(ENV_MODE, "enum");
        std::env::set_var(ENV_CONCENTRATION, "tanh");
        let mut config = VariationalConfig::new(8);
        config.apply_env_overrides();
        for key in [ENV_N_SAMPLES, ENV_MODE, ENV_CONCENTRATION] {
            std::env::remove_var(key);
        }

        assert_eq!(config.n_samples, 7);
        assert_eq!(config.mode, AttnMode::Enumerate);
        assert_eq!(config.concentration, ConcentrationFn::Softplus);
    }
}
