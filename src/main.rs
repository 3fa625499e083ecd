use chrono::{Days, Duration, NaiveDate, Utc};
use energy_rollup::boundary::{current_boundary, next_boundary};
use energy_rollup::config::Config;
use energy_rollup::repositories::{PgRollupRepository, RollupRepository};
use energy_rollup::services::{characterise_window, evaluate_polls, IntervalRollup};
use energy_rollup::window::Window;
use energy_rollup::db;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(
        "loaded config; systems: {}, pollers: {}",
        cfg.systems.len(),
        cfg.pollers.len()
    );

    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    db::ensure_schema(&pool).await?;
    info!("connected to database");

    let repository: Arc<dyn RollupRepository> = Arc::new(PgRollupRepository::new(pool));
    let rollup = IntervalRollup::new(repository.clone(), cfg.rollup.interval_minutes);
    let scheduler = cfg.scheduler();
    let interval_minutes = cfg.rollup.interval_minutes;
    let offset = cfg.rollup.utc_offset_minutes;

    if cfg.rollup.backfill_intervals > 0 {
        let to_end = current_boundary(Utc::now(), interval_minutes, offset).timestamp_millis();
        let from_end =
            to_end - (cfg.rollup.backfill_intervals as i64 - 1) * rollup.interval_length_ms();
        for system in &cfg.systems {
            rollup
                .recompute_range(&system.id, &system.points, from_end, to_end)
                .await;
        }
    }

    let mut last_characterised: Option<NaiveDate> = None;

    // Advanced from the last processed boundary, not the clock.
    let mut next = next_boundary(Utc::now(), interval_minutes, offset);

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    loop {
        let now = Utc::now();
        let boundary = next;
        let behind = now - boundary.with_timezone(&Utc);
        let wait = (-behind).to_std().unwrap_or_default();
        if behind > Duration::zero() {
            warn!(interval_end = %boundary, behind_secs = behind.num_seconds(), "rollup running behind; catching up");
        } else {
            debug!(next = %boundary, "waiting for interval boundary");
        }

        tokio::select! {
            biased;
            _ = &mut sig => {
                info!("shutdown requested");
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        next = next_boundary(boundary.with_timezone(&Utc), interval_minutes, offset);

        let interval_end_ms = boundary.timestamp_millis();
        for system in &cfg.systems {
            if let Some(rows) = rollup
                .run_interval(&system.id, &system.points, interval_end_ms)
                .await
            {
                info!(system_id = %system.id, interval_end = %boundary, rows = rows.len(), "interval stored");
            }
        }

        match evaluate_polls(repository.as_ref(), &scheduler, Utc::now()).await {
            Ok(decisions) => {
                for (entity, decision) in decisions {
                    if decision.should_poll {
                        info!(entity = %entity, reason = %decision.reason, "poll due");
                    } else {
                        debug!(entity = %entity, reason = %decision.reason, "poll skipped");
                    }
                }
            }
            Err(e) => warn!("poll evaluation failed: {e}"),
        }

        // Characterise the preceding local day(s) once per local date.
        let today = boundary.date_naive();
        if last_characterised == Some(today) {
            continue;
        }
        let Some(first_day) = today.checked_sub_days(Days::new(cfg.characterisation.days as u64))
        else {
            warn!(%today, "cannot derive characterisation window");
            last_characterised = Some(today);
            continue;
        };
        let window = match Window::for_local_days(
            first_day,
            cfg.characterisation.days,
            cfg.characterisation.period_minutes,
            offset,
        ) {
            Ok(window) => window,
            Err(e) => {
                warn!("characterisation window rejected: {e}");
                last_characterised = Some(today);
                continue;
            }
        };
        for system in &cfg.systems {
            let point_ids = system.point_ids();
            match characterise_window(
                repository.as_ref(),
                &system.id,
                &point_ids,
                window,
                cfg.quality_alphabet.clone(),
            )
            .await
            {
                Ok(report) => {
                    info!(
                        system_id = %system.id,
                        %first_day,
                        completeness = %report.completeness,
                        ranges = report.ranges.len(),
                        "window characterised"
                    );
                    match serde_json::to_string(&report) {
                        Ok(json) => debug!(system_id = %system.id, report = %json, "characterisation report"),
                        Err(e) => warn!("failed to encode characterisation report: {e}"),
                    }
                }
                Err(e) => warn!(system_id = %system.id, "characterisation failed: {e}"),
            }
        }
        last_characterised = Some(today);
    }

    Ok(())
}
