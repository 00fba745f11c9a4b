//! Configuração do newslean carregada a partir de `newslean.toml`.
//!
//! Todo campo tem valor padrão, então um arquivo ausente é uma configuração
//! válida. A variável de ambiente `OPENAI_API_KEY` tem precedência sobre o
//! arquivo. [`Layout`] deriva todos os caminhos em disco de `data_dir`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PipelineError;
use crate::planner::OversizePolicy;
use crate::tasks::TaskKind;
use crate::truncate::TextLimits;

pub const DEFAULT_CONFIG_FILE: &str = "newslean.toml";

/// Modelo e orçamento de cada tipo de tarefa.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSettings {
    pub model: String,
    #[serde(default = "default_task_max_tokens")]
    pub max_tokens: u32,
    /// Teto de tokens de um lote enviado.
    pub budget_tokens: u64,
    /// Dólares por milhão de tokens de entrada, usado na estimativa antes do envio.
    #[serde(default)]
    pub price_per_mtok: f64,
}

// Valor padrão para tokens de resposta: 8.
fn default_task_max_tokens() -> u32 {
    8
}

fn default_screen() -> TaskSettings {
    TaskSettings {
        model: "gpt-3.5-turbo-0125".into(),
        max_tokens: 8,
        budget_tokens: 200_000,
        price_per_mtok: 0.25,
    }
}

fn default_lean() -> TaskSettings {
    TaskSettings {
        model: "gpt-4o-2024-05-13".into(),
        max_tokens: 8,
        budget_tokens: 90_000,
        price_per_mtok: 2.50,
    }
}

fn default_topic() -> TaskSettings {
    TaskSettings {
        model: "gpt-4o-mini".into(),
        max_tokens: 8,
        budget_tokens: 19_950_000,
        price_per_mtok: 0.075,
    }
}

/// Seções `[tasks.screen]`, `[tasks.lean]` e `[tasks.topic]`.
#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_screen")]
    pub screen: TaskSettings,
    #[serde(default = "default_lean")]
    pub lean: TaskSettings,
    #[serde(default = "default_topic")]
    pub topic: TaskSettings,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            screen: default_screen(),
            lean: default_lean(),
            topic: default_topic(),
        }
    }
}

impl TasksConfig {
    pub fn get(&self, kind: TaskKind) -> &TaskSettings {
        match kind {
            TaskKind::Screen => &self.screen,
            TaskKind::Lean => &self.lean,
            TaskKind::Topic => &self.topic,
        }
    }
}

/// Configuração de nível superior carregada de `newslean.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Chave da API OpenAI.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Raiz das famílias de arquivos do pipeline.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Intervalo entre consultas de status, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Retentativas de consulta e download; envios nunca são repetidos.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Pede confirmação ao operador antes de cada envio.
    #[serde(default = "default_confirm")]
    pub confirm: bool,

    /// Caracteres por token na conversão do orçamento.
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,

    #[serde(default)]
    pub oversize: OversizePolicy,

    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Temas vistos menos vezes que isso ficam fora das estatísticas por categoria.
    #[serde(default = "default_category_min_count")]
    pub category_min_count: usize,

    #[serde(default)]
    pub tasks: TasksConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

// Valor padrão para o intervalo de consulta: 3s.
fn default_poll_interval_secs() -> u64 {
    3
}

fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_confirm() -> bool {
    true
}

fn default_chars_per_token() -> f64 {
    3.5
}

fn default_min_length() -> usize {
    500
}

fn default_max_length() -> usize {
    1000
}

// Valor padrão para o mínimo por categoria: 20.
fn default_category_min_count() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            data_dir: default_data_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            confirm: default_confirm(),
            chars_per_token: default_chars_per_token(),
            oversize: OversizePolicy::default(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            category_min_count: default_category_min_count(),
            tasks: TasksConfig::default(),
        }
    }
}

impl Config {
    /// Carrega de `path`, ou de `newslean.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir; um arquivo inválido é erro.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo para a chave API.
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.chars_per_token <= 0.0 {
            return Err(PipelineError::Config(
                "chars_per_token must be positive".into(),
            ));
        }
        if self.max_length == 0 {
            return Err(PipelineError::Config("max_length must be positive".into()));
        }
        Ok(())
    }

    /// Orçamento em caracteres de um lote de `kind`.
    pub fn char_budget(&self, kind: TaskKind) -> usize {
        (self.tasks.get(kind).budget_tokens as f64 * self.chars_per_token) as usize
    }

    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            min_length: self.min_length,
            max_length: self.max_length,
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.data_dir)
    }
}

/// Famílias de arquivos sob o diretório de dados.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Corpus coletado, como produzido pelo coletor.
    pub fn scraped_corpus(&self) -> PathBuf {
        self.root.join("data").join("article_info.csv")
    }

    /// Corpus após remover artigos curtos e truncar os demais.
    pub fn abridged_corpus(&self) -> PathBuf {
        self.root.join("data").join("article_abridged.csv")
    }

    /// Diretório de publicações `Name, State/Country, City, Link`.
    pub fn publications(&self) -> PathBuf {
        self.root.join("data").join("publications.csv")
    }

    pub fn request_file(&self, kind: TaskKind) -> PathBuf {
        self.root
            .join("requests_in")
            .join(format!("batch_{kind}_in.jsonl"))
    }

    pub fn response_file(&self, kind: TaskKind) -> PathBuf {
        self.root
            .join("requests_out")
            .join(format!("batch_{kind}_out.jsonl"))
    }

    /// Falhas por requisição relatadas pelo endpoint no último lote.
    pub fn error_file(&self, kind: TaskKind) -> PathBuf {
        self.root
            .join("requests_out")
            .join(format!("batch_{kind}_errors.jsonl"))
    }

    /// Chaves de correlação do último trecho que voltaram sem resultado.
    pub fn missing_file(&self, kind: TaskKind) -> PathBuf {
        self.root
            .join("requests_out")
            .join(format!("batch_{kind}_missing.txt"))
    }

    pub fn results_store(&self, kind: TaskKind) -> PathBuf {
        self.root
            .join("results")
            .join(format!("article_{kind}.csv"))
    }

    pub fn checkpoint_log(&self, kind: TaskKind) -> PathBuf {
        self.root.join("log").join(format!("{kind}_log.csv"))
    }

    pub fn report(&self, name: &str) -> PathBuf {
        self.root.join("results").join(format!("{name}.csv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.max_retries, 3);
        assert!(config.confirm);
        assert_eq!(config.min_length, 500);
        assert_eq!(config.max_length, 1000);
        assert_eq!(config.oversize, OversizePolicy::Reject);
        assert_eq!(config.tasks.lean.model, "gpt-4o-2024-05-13");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_key = "sk-test-123"
            confirm = false
            oversize = "isolate"

            [tasks.lean]
            model = "gpt-4o"
            budget_tokens = 1000
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "sk-test-123");
        assert!(!config.confirm);
        assert_eq!(config.oversize, OversizePolicy::Isolate);
        assert_eq!(config.tasks.lean.model, "gpt-4o");
        assert_eq!(config.tasks.lean.max_tokens, 8);
        assert_eq!(config.tasks.screen.budget_tokens, 200_000);
        assert_eq!(config.category_min_count, 20);
    }

    #[test]
    fn char_budget_scales_tokens() {
        let config = Config::default();
        assert_eq!(config.char_budget(TaskKind::Screen), 700_000);
        assert_eq!(config.char_budget(TaskKind::Lean), 315_000);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newslean.toml");
        std::fs::write(&path, "chars_per_token = 0.0\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn layout_paths_are_per_kind() {
        let layout = Layout::new(Path::new("/work"));
        assert_eq!(
            layout.request_file(TaskKind::Lean),
            Path::new("/work/requests_in/batch_lean_in.jsonl")
        );
        assert_eq!(
            layout.results_store(TaskKind::Topic),
            Path::new("/work/results/article_topic.csv")
        );
        assert_eq!(
            layout.checkpoint_log(TaskKind::Screen),
            Path::new("/work/log/screen_log.csv")
        );
        assert_eq!(
            layout.missing_file(TaskKind::Lean),
            Path::new("/work/requests_out/batch_lean_missing.txt")
        );
        assert_eq!(
            layout.error_file(TaskKind::Screen),
            Path::new("/work/requests_out/batch_screen_errors.jsonl")
        );
    }
}
