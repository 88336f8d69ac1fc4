// Tick-to-seconds conversion.
//
// The whole score is timed with a single factor taken from the first tempo
// meta-event of track 0. Tempo changes later in the file are not honoured;
// every tick lasts `tempo / 1_000_000 / ticks_per_beat` seconds.

use midly::{MetaMessage, Timing, TrackEvent, TrackEventKind};

use crate::error::ScoreError;

/// Seconds per tick for a tempo in microseconds per beat.
pub fn tick_seconds(tempo_us_per_beat: u32, ticks_per_beat: u16) -> f64 {
    tempo_us_per_beat as f64 / 1_000_000.0 / ticks_per_beat as f64
}

/// Ticks per beat from a metrical header. SMPTE timecode is rejected.
pub fn ticks_per_beat(timing: &Timing) -> Result<u16, ScoreError> {
    match timing {
        Timing::Metrical(ticks) => match ticks.as_int() {
            0 => Err(ScoreError::ZeroTicksPerBeat),
            t => Ok(t),
        },
        Timing::Timecode(..) => Err(ScoreError::UnsupportedTiming),
    }
}

/// Find the first tempo event in `first_track` and derive seconds per tick.
pub fn resolve_tick_seconds(
    timing: &Timing,
    first_track: &[TrackEvent],
) -> Result<f64, ScoreError> {
    let ticks = ticks_per_beat(timing)?;
    first_track
        .iter()
        .find_map(|event| match event.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Some(tempo.as_int()),
            _ => None,
        })
        .map(|tempo| tick_seconds(tempo, ticks))
        .ok_or(ScoreError::MissingTempo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28};
    use midly::Fps;

    fn tempo_event(tempo: u32) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        }
    }

    #[test]
    fn standard_tempo() {
        // 120 BPM at 480 ticks per beat.
        let secs = tick_seconds(500_000, 480);
        assert!((secs - 0.5 / 480.0).abs() < 1e-12);
        assert!((secs - 0.0010417).abs() < 1e-7);
    }

    #[test]
    fn first_tempo_wins() {
        let track = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(b"tempo")),
            },
            tempo_event(600_000),
            tempo_event(300_000),
        ];
        let secs = resolve_tick_seconds(&Timing::Metrical(u15::new(96)), &track).unwrap();
        assert!((secs - 0.6 / 96.0).abs() < 1e-12);
    }

    #[test]
    fn missing_tempo_is_fatal() {
        let track = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }];
        assert!(matches!(
            resolve_tick_seconds(&Timing::Metrical(u15::new(480)), &track),
            Err(ScoreError::MissingTempo)
        ));
    }

    #[test]
    fn timecode_timing_is_rejected() {
        let track = vec![tempo_event(500_000)];
        assert!(matches!(
            resolve_tick_seconds(&Timing::Timecode(Fps::Fps25, 40), &track),
            Err(ScoreError::UnsupportedTiming)
        ));
    }
}
