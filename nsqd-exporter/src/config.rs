use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Stratégie d'invalidation des séries quand la topologie rétrécit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Toute disparition vide le registre entier de la cible
    #[default]
    Reset,
    /// Seules les séries qui référencent un nom disparu sont retirées
    Precise,
    /// Toute série non réécrite par le snapshot courant est retirée
    Sweep,
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reset" => Ok(EvictionPolicy::Reset),
            "precise" => Ok(EvictionPolicy::Precise),
            "sweep" => Ok(EvictionPolicy::Sweep),
            other => Err(format!("unknown eviction policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Chemin ajouté à l'adresse de la cible (ex: http://nsqd:4151/stats?format=json)
    pub stats_path: String,
    pub default_timeout_secs: f64,
    pub timeout_offset_secs: f64,
    pub min_timeout_secs: f64,
    pub eviction: EvictionPolicy,
    pub target_idle_ttl_secs: u64,
    pub max_targets: usize,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            listen_port: 12500,
            stats_path: "/stats?format=json".into(),
            default_timeout_secs: 120.0,
            timeout_offset_secs: 0.5,
            min_timeout_secs: 0.1,
            eviction: EvictionPolicy::Reset,
            target_idle_ttl_secs: 3600,
            max_targets: 1024,
        }
    }
}

impl ExporterConfig {
    pub fn target_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.target_idle_ttl_secs)
    }
}

pub async fn load_config() -> ExporterConfig {
    let path = std::env::var("NSQD_EXPORTER_CONFIG").unwrap_or_else(|_| "exporter.yaml".into());
    load_config_from(&path).await
}

/// Fichier absent ou invalide => config par défaut, jamais d'erreur fatale
pub async fn load_config_from<P: AsRef<Path>>(path: P) -> ExporterConfig {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!("[config] no {} found, using defaults", path.display());
        return ExporterConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return ExporterConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        tracing::warn!("[config] invalid {}: {e}", path.display());
        ExporterConfig::default()
    })
}
