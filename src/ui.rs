//! Saída de terminal do newslean: spinner de acompanhamento dos lotes e mensagens coloridas.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente
//! um lote enquanto ele é enviado, consultado e recuperado.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{JobReport, JobState};

/// Indicador visual de progresso para um lote no terminal.
///
/// Exibe um spinner animado durante a espera e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e retentativa (amarelo).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com a descrição do lote.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("CREATED: {description}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self::with_bar(pb)
    }

    /// Progresso invisível, para testes e execuções sem terminal.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner para o estado atual.
    pub fn update_state(&self, state: JobState, detail: &str) {
        self.pb.set_message(format!("{state}: {detail}"));
    }

    /// Exibe uma retentativa de consulta com o número da tentativa e o motivo.
    pub fn retry(&self, attempt: u32, max: u32, reason: &str) {
        self.pb.println(format!(
            "  {} Retry {attempt}/{max}: {reason}",
            self.yellow.apply_to("↻")
        ));
    }

    /// Finaliza o spinner e exibe o resultado do lote.
    pub fn complete(&self, report: &JobReport) {
        self.pb.finish_and_clear();
        let batch = report.batch_id.as_deref().unwrap_or("-");
        match report.state {
            JobState::Completed if report.missing > 0 => println!(
                "  {} {} batch {batch}: {} rows appended, {} lines skipped, {} missing",
                self.yellow.apply_to("!"),
                report.kind,
                report.rows_appended,
                report.lines_skipped,
                report.missing
            ),
            JobState::Completed => println!(
                "  {} {} batch {batch}: {} rows appended, {} lines skipped",
                self.green.apply_to("✓"),
                report.kind,
                report.rows_appended,
                report.lines_skipped
            ),
            state => println!(
                "  {} {} batch {batch} ended {state}",
                self.red.apply_to("✗"),
                report.kind
            ),
        }
    }

    /// Imprime o relatório do lote em JSON com estilo colorido.
    pub fn print_report(&self, report: &JobReport) {
        let style = match report.state {
            JobState::Completed => &self.green,
            JobState::Failed | JobState::Cancelled => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", style.apply_to("─── Job Report ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }
}
