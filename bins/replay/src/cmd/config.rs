use std::time::Duration;

use clap::Args;

use super::schedule::Pacing;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// JSON файл с массивом треков
    #[arg(long, env = "RADAR_REPLAY_FILE")]
    pub file: String,

    /// Куда слать datagram'ы
    #[arg(long, default_value = "127.0.0.1:5005", env = "RADAR_REPLAY_TARGET")]
    pub target: String,

    /// Фиксированная пауза между пакетами, мс
    #[arg(long, conflicts_with = "time_field")]
    pub interval_ms: Option<u64>,

    /// Воспроизводить записанные интервалы по этому полю (напр. tofa_utc)
    #[arg(long)]
    pub time_field: Option<String>,

    /// Сколько раз проиграть файл
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

impl ReplayArgs {
    pub fn pacing(&self) -> Pacing {
        match (&self.time_field, self.interval_ms) {
            (Some(field), _) => Pacing::Recorded(field.clone()),
            (None, Some(ms)) => Pacing::Interval(Duration::from_millis(ms)),
            (None, None) => Pacing::Flat,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Сколько излучателей
    #[arg(long, default_value_t = 8)]
    pub emitters: usize,

    /// Сколько тактов; на каждом такте по записи от каждого излучателя
    #[arg(long, default_value_t = 100)]
    pub steps: usize,

    /// Шаг между тактами по tofa_utc, мс
    #[arg(long, default_value_t = 250)]
    pub interval_ms: u64,

    /// Начальный tofa_utc (RFC 3339); по умолчанию сейчас
    #[arg(long)]
    pub from: Option<String>,

    /// Seed генератора; 0 — от часов
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Записать JSON массив в файл вместо stdout
    #[arg(long, conflicts_with = "target")]
    pub out: Option<String>,

    /// Сразу проиграть в UDP с записанными интервалами
    #[arg(long)]
    pub target: Option<String>,
}
