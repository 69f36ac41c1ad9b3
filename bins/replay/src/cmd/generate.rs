use std::io::Write;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use radar_api::{format_instant, parse_instant};

use super::config::GenerateArgs;
use super::domain::{new_emitters, Platform, Rng};
use super::error::ReplayError;
use super::replay;
use super::schedule::{self, Pacing};

/// Метров, которые платформа проходит за один такт.
const PLATFORM_STEP_M: f64 = 15.0;

// ═══════════════════════════════════════════════════════════════
//  Main dispatch
// ═══════════════════════════════════════════════════════════════

pub async fn run(args: &GenerateArgs) -> Result<(), ReplayError> {
    if args.emitters == 0 || args.steps == 0 {
        return Err(ReplayError::Config("--emitters and --steps must be positive".into()));
    }
    let from = match args.from.as_deref() {
        Some(s) => parse_instant(s)
            .ok_or_else(|| ReplayError::Config(format!("--from: cannot parse time: {s}")))?,
        None => Utc::now(),
    };

    let records = generate(args, from);
    tracing::info!(
        records = records.len(),
        emitters = args.emitters,
        steps = args.steps,
        interval_ms = args.interval_ms,
        "generated tracks"
    );

    if let Some(ref target) = args.target {
        let (entries, _) = schedule::build(records, &Pacing::Recorded("tofa_utc".into()));
        return replay::stream(&entries, target, 1).await;
    }

    let data = serde_json::to_vec_pretty(&records).map_err(ReplayError::Encode)?;
    match args.out {
        Some(ref path) => std::fs::write(path, &data).map_err(|source| ReplayError::Write {
            path: path.clone(),
            source,
        })?,
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(&data)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
    }
    Ok(())
}

/// Треки `emitters` излучателей за `steps` тактов, упорядоченные по `tofa_utc`.
pub fn generate(args: &GenerateArgs, from: DateTime<Utc>) -> Vec<Value> {
    let mut rng = Rng::new(args.seed);
    let mut emitters = new_emitters(&mut rng, args.emitters);
    let mut platform = Platform::new(&mut rng);
    let interval_ms = args.interval_ms.max(1) as i64;

    let mut records = Vec::with_capacity(args.emitters * args.steps);
    for step in 0..args.steps as i64 {
        platform.advance(&mut rng, PLATFORM_STEP_M);
        let base = from + TimeDelta::milliseconds(step * interval_ms);

        let mut tick: Vec<(DateTime<Utc>, Value)> = emitters
            .iter_mut()
            .map(|emitter| {
                emitter.tick(&mut rng);
                let jitter = rng.next_intn(interval_ms as usize) as i64;
                let tofa = base + TimeDelta::milliseconds(jitter);
                let record = emitter.to_record(&mut rng, format_instant(&tofa), &platform);
                (tofa, Value::Object(record))
            })
            .collect();
        tick.sort_by_key(|(tofa, _)| *tofa);
        records.extend(tick.into_iter().map(|(_, record)| record));
    }
    records
}
