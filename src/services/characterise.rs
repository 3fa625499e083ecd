use crate::characterisation::{CharacterisationReport, QualityCharacteriser};
use crate::error::Result;
use crate::quality::QualityAlphabet;
use crate::repositories::RollupRepository;
use crate::window::Window;
use tracing::debug;

/// Reads every reading for `system_id`'s `point_ids` inside `window` and
/// characterises it.
///
/// A reading outside the window is a caller error and aborts the whole
/// characterisation.
pub async fn characterise_window(
    repository: &dyn RollupRepository,
    system_id: &str,
    point_ids: &[String],
    window: Window,
    alphabet: QualityAlphabet,
) -> Result<CharacterisationReport> {
    let readings = repository
        .fetch_window_readings(system_id, point_ids, window.start_ms(), window.end_ms())
        .await?;

    let mut characteriser = QualityCharacteriser::new(window, alphabet, point_ids.iter().cloned());
    for reading in &readings {
        characteriser.add_reading(&reading.point_id, reading.measurement_time_ms, reading.quality)?;
    }

    let report = characteriser.report();
    debug!(
        system_id = %system_id,
        points = point_ids.len(),
        readings = readings.len(),
        ranges = report.ranges.len(),
        completeness = %report.completeness,
        "window characterised"
    );
    Ok(report)
}
