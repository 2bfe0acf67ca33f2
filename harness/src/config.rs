use std::fs;
use std::path::Path;

use gc_gen::{GeneratorConfig, ProgramMutationConfig};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::evolution::EvolutionConfig;
use crate::fitness::FitnessConfig;
use crate::pool::PoolConfig;

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<()>;
}

/// Everything `gc evolve` can be tuned with. Missing sections and fields
/// take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub evolution: EvolutionConfig,
    pub fitness: FitnessConfig,
    pub mutation: ProgramMutationConfig,
    pub generator: GeneratorConfig,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarnessError::Configuration(format!(
                "configuration file {} does not exist",
                path.display()
            )));
        }
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.evolution.validate()?;
        self.fitness.validate()?;
        self.mutation.validate()?;
        self.generator.validate()
    }
}

fn invalid(section: &str, message: &str) -> HarnessError {
    HarnessError::Configuration(format!("[{section}] {message}"))
}

fn probability(section: &str, name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(section, &format!("{name} must be between 0 and 1")))
    }
}

impl ConfigSection for PoolConfig {
    fn section_name() -> &'static str {
        "pool"
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid(Self::section_name(), "workers must be at least 1"));
        }
        if self.liveness_ms == 0 {
            return Err(invalid(Self::section_name(), "liveness_ms must be positive"));
        }
        Ok(())
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<()> {
        let section = Self::section_name();
        if self.population_size == 0 {
            return Err(invalid(section, "population_size must be at least 1"));
        }
        probability(section, "survive_top", self.survive_top)?;
        probability(section, "survive_random", self.survive_random)?;
        probability(section, "new_random", self.new_random)?;
        if self.survive_top + self.survive_random + self.new_random > 1.0 {
            return Err(invalid(section, "survival and new fractions must sum to at most 1"));
        }
        Ok(())
    }
}

impl ConfigSection for FitnessConfig {
    fn section_name() -> &'static str {
        "fitness"
    }

    fn validate(&self) -> Result<()> {
        if self.reward < 0.0 || self.runtime_penalty < 0.0 || self.io_penalty < 0.0 {
            return Err(invalid(Self::section_name(), "rewards and penalties must not be negative"));
        }
        Ok(())
    }
}

impl ConfigSection for ProgramMutationConfig {
    fn section_name() -> &'static str {
        "mutation"
    }

    fn validate(&self) -> Result<()> {
        let section = Self::section_name();
        probability(section, "p_mutate", self.p_mutate)?;
        probability(section, "p_again", self.p_again)?;
        if self.insert_weight + self.delete_weight + self.modify_weight == 0 {
            return Err(invalid(section, "edit weights must not all be zero"));
        }
        if self.replace_weight + self.replace_block_weight + self.splice_weight == 0 {
            return Err(invalid(section, "nested edit weights must not all be zero"));
        }
        Ok(())
    }
}

impl ConfigSection for GeneratorConfig {
    fn section_name() -> &'static str {
        "generator"
    }

    fn validate(&self) -> Result<()> {
        let section = Self::section_name();
        if self.literal_min > self.literal_max {
            return Err(invalid(section, "literal_min must not exceed literal_max"));
        }
        if self.length_scale <= 0.0 || self.max_lines == 0 {
            return Err(invalid(section, "length_scale and max_lines must be positive"));
        }
        Ok(())
    }
}
