//! Environment-backed settings

use config::{Config, Environment};
use serde::Deserialize;

use crate::ConfigError;

/// Which conversation engine a new session gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Full pipeline: Deepgram STT -> LLM -> TTS
    DeepgramPipeline,
    /// Native-audio duplex relay (Gemini Live)
    #[default]
    GeminiLive,
}

/// TTS provider for the full pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TtsProvider {
    #[default]
    Elevenlabs,
    Kokoro,
}

/// Application settings.
///
/// Field names mirror the environment variables (`DEEPGRAM_API_KEY` ->
/// `deepgram_api_key`, and so on). Every field has a default so a bare
/// environment still produces a usable duplex-variant deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Engine selector
    #[serde(default)]
    pub conversation_engine: EngineKind,

    /// Deepgram recognizer key (pipeline variant)
    #[serde(default)]
    pub deepgram_api_key: Option<String>,

    /// OpenAI-compatible chat endpoint
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// Chat endpoint key (pipeline variant)
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Chat model id
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// TTS provider selector (pipeline variant)
    #[serde(default)]
    pub tts_provider: TtsProvider,

    /// ElevenLabs key
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs voice id
    #[serde(default = "default_elevenlabs_voice")]
    pub elevenlabs_voice_id: String,

    /// Kokoro endpoint
    #[serde(default = "default_kokoro_base_url")]
    pub kokoro_base_url: String,

    /// Kokoro voice
    #[serde(default = "default_kokoro_voice")]
    pub kokoro_voice: String,

    /// Gemini Live key (duplex variant)
    #[serde(default)]
    pub google_api_key: Option<String>,

    /// Persona half of the system prompt
    #[serde(default = "default_soul_path")]
    pub soul_path: String,

    /// Rules half of the system prompt
    #[serde(default = "default_rules_path")]
    pub rules_path: String,
}

fn default_port() -> u16 {
    8000
}

fn default_llm_base_url() -> String {
    "https://api.letsdisagree.com/v1".to_string()
}

fn default_llm_model() -> String {
    "ag/gemini-3-flash".to_string()
}

fn default_elevenlabs_voice() -> String {
    "Puck".to_string()
}

fn default_kokoro_base_url() -> String {
    "https://kokoro.jmwalker.dev".to_string()
}

fn default_kokoro_voice() -> String {
    "af_bella".to_string()
}

fn default_soul_path() -> String {
    "SOUL.md".to_string()
}

fn default_rules_path() -> String {
    "RULES.md".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(Config::builder().build().expect("empty config"))
            .expect("defaults deserialize")
    }
}

impl Settings {
    /// Deserialize settings out of an assembled `Config`.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize().map_err(ConfigError::from)
    }

    /// Keys the full pipeline needs before a session may use it.
    ///
    /// Returns the first missing key so the factory can log why it fell
    /// back to the duplex variant.
    pub fn require_pipeline_keys(&self) -> Result<(), ConfigError> {
        if !present(&self.deepgram_api_key) {
            return Err(ConfigError::MissingKey("DEEPGRAM_API_KEY"));
        }
        if !present(&self.llm_api_key) {
            return Err(ConfigError::MissingKey("LLM_API_KEY"));
        }
        match self.tts_provider {
            TtsProvider::Elevenlabs if !present(&self.elevenlabs_api_key) => {
                Err(ConfigError::MissingKey("ELEVENLABS_API_KEY"))
            }
            _ => Ok(()),
        }
    }

    /// Key for the duplex variant, if configured.
    pub fn require_duplex_key(&self) -> Result<&str, ConfigError> {
        self.google_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingKey("GOOGLE_API_KEY"))
    }
}

fn present(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.is_empty())
}

/// Load settings from the process environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(Environment::default().try_parsing(true))
        .build()?;
    Settings::from_config(config)
}
