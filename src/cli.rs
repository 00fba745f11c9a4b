//! Interface de linha de comando do newslean baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (ingest, abridge,
//! submit, retrieve, aggregate, status) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::tasks::TaskKind;

/// Pontua artigos de jornais estudantis em lotes e agrega as notas por publicação.
#[derive(Debug, Parser)]
#[command(name = "newslean", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./newslean.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Tipo de tarefa aceito pela CLI, mapeado para [`TaskKind`] internamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Triagem S/N: o artigo trata de temas sociais ou políticos?
    Screen,
    /// Nota de inclinação política entre -42 e 42.
    Lean,
    /// Um tema da lista fixa de categorias.
    Topic,
}

impl From<KindArg> for TaskKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Screen => TaskKind::Screen,
            KindArg::Lean => TaskKind::Lean,
            KindArg::Topic => TaskKind::Topic,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Agrupa as linhas planas do coletor em um corpus hierárquico.
    Ingest {
        /// CSV sem cabeçalho: publicação, seção, url, título, texto.
        input: PathBuf,

        /// Corpus coletado (padrão: data/article_info.csv).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Remove artigos curtos e trunca os demais.
    Abridge {
        /// Corpus coletado (padrão: data/article_info.csv).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Corpus resumido (padrão: data/article_abridged.csv).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Envia os artigos de um tipo de tarefa, lote por lote.
    Submit {
        kind: KindArg,

        /// Posição inicial na lista de itens.
        #[arg(long, conflicts_with = "resume")]
        start: Option<usize>,

        /// Retoma a partir do último checkpoint.
        #[arg(long)]
        resume: bool,

        /// Não pede confirmação antes de cada envio.
        #[arg(long, short)]
        yes: bool,

        /// Ignora as primeiras N linhas dos resultados de triagem.
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,
    },

    /// Acompanha um lote já enviado e grava seus resultados.
    Retrieve { kind: KindArg, batch_id: String },

    /// Recalcula as notas por publicação, cidade, estado e tema.
    Aggregate,

    /// Mostra checkpoint e quantidade de resultados por tipo de tarefa.
    Status,
}
