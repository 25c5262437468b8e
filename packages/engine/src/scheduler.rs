//! Window scheduling.
//!
//! A pure function of (durable state, config template, clock): no I/O, no
//! clock reads. The engine supplies `safe_now`, already pulled back by the
//! upstream readiness gap, so every decision here is reproducible in tests.
//!
//! Successive windows tile time exactly: each new window starts one
//! millisecond after the reference window's upper bound, so no event
//! timestamp can fall between two windows or inside both.

use chrono::{DateTime, Duration, Utc};
use ffs_puller_state::Window;

/// How far behind real time the upstream guarantees event readiness.
#[must_use]
pub fn safety_gap() -> Duration {
    Duration::minutes(15)
}

/// Scheduling decision for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Fetch this window next.
    Window(Window),
    /// The configured end time is reached; the engine should wind down.
    Done,
}

/// Computes the next window.
///
/// `config_after` is the `ON_OR_AFTER` value from the original query
/// template, consulted only when no durable state exists yet. `max_time` is
/// the template's original `ON_OR_BEFORE`, the absolute end of ingestion.
/// `safe_now` is the caller's clock minus [`safety_gap`].
#[must_use]
pub fn advance(
    in_progress: &[Window],
    last_completed: Option<Window>,
    config_after: Option<DateTime<Utc>>,
    time_gap: Duration,
    max_time: Option<DateTime<Utc>>,
    safe_now: DateTime<Utc>,
) -> Advance {
    let one_ms = Duration::milliseconds(1);

    let reference = match (in_progress.last(), last_completed) {
        (Some(in_progress), Some(completed)) => {
            if completed.on_or_before > in_progress.on_or_before {
                Some(completed)
            } else {
                Some(*in_progress)
            }
        }
        (Some(in_progress), None) => Some(*in_progress),
        (None, Some(completed)) => Some(completed),
        (None, None) => None,
    };

    let mut candidate = match reference {
        // Advance past the newest known window.
        Some(reference) => {
            let after = reference.on_or_before + one_ms;
            Window::new(after, after + time_gap)
        }
        // Nothing has ever run: the first window is derived from the config
        // template, or anchored to the present when the template is open.
        None => match config_after {
            Some(config_after) => {
                let after = config_after + one_ms;
                Window::new(after, after + time_gap)
            }
            None => Window::new(safe_now - time_gap, safe_now + time_gap),
        },
    };

    if let Some(max_time) = max_time {
        if max_time <= candidate.on_or_after {
            return Advance::Done;
        }
        if max_time < candidate.on_or_before {
            candidate.on_or_before = max_time;
        }
    }

    if candidate.on_or_before > safe_now {
        candidate.on_or_before = safe_now;
    }

    Advance::Window(candidate)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn ms(t: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        t + Duration::milliseconds(millis)
    }

    fn gap() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn cold_start_with_config_issues_the_template_window() {
        // Config: after=00:00, before=01:00, gap=5m, now=02:00.
        let advance = advance(
            &[],
            None,
            Some(at(0, 0, 0)),
            gap(),
            Some(at(1, 0, 0)),
            at(2, 0, 0) - safety_gap(),
        );

        assert_eq!(
            advance,
            Advance::Window(Window::new(ms(at(0, 0, 0), 1), ms(at(0, 5, 0), 1)))
        );
    }

    #[test]
    fn cold_start_without_config_anchors_to_safe_now() {
        let safe_now = at(2, 0, 0) - safety_gap();
        let result = advance(&[], None, None, gap(), None, safe_now);

        // before is capped to safe_now, so the first window covers the last
        // time_gap of ready data.
        assert_eq!(
            result,
            Advance::Window(Window::new(safe_now - gap(), safe_now))
        );
    }

    #[test]
    fn windows_tile_with_one_millisecond_seams() {
        let mut last_completed = None;
        let mut previous: Option<Window> = None;

        for _ in 0..10 {
            let result = advance(
                &[],
                last_completed,
                Some(at(0, 0, 0)),
                gap(),
                None,
                at(12, 0, 0),
            );
            let Advance::Window(window) = result else {
                panic!("expected a window");
            };
            if let Some(previous) = previous {
                assert_eq!(
                    window.on_or_after,
                    ms(previous.on_or_before, 1),
                    "windows must be disjoint and adjacent"
                );
            }
            assert!(window.on_or_after < window.on_or_before);
            previous = Some(window);
            last_completed = Some(window);
        }
    }

    #[test]
    fn reference_is_the_newest_of_in_progress_and_completed() {
        // Crash-replay shape: two in-progress windows ahead of the completed
        // marker. The next window continues after the newest in-progress.
        let in_progress = vec![
            Window::new(at(10, 0, 0), at(10, 5, 0)),
            Window::new(ms(at(10, 5, 0), 1), ms(at(10, 10, 0), 1)),
        ];
        let last_completed = Some(Window::new(at(9, 55, 0), at(10, 0, 0)));

        let result = advance(
            &in_progress,
            last_completed,
            Some(at(0, 0, 0)),
            gap(),
            None,
            at(12, 0, 0),
        );

        assert_eq!(
            result,
            Advance::Window(Window::new(ms(at(10, 10, 0), 2), ms(at(10, 15, 0), 2)))
        );
    }

    #[test]
    fn completed_marker_ahead_of_in_progress_wins() {
        let in_progress = vec![Window::new(at(10, 0, 0), at(10, 5, 0))];
        let last_completed = Some(Window::new(ms(at(10, 5, 0), 1), ms(at(10, 10, 0), 1)));

        let Advance::Window(window) = advance(
            &in_progress,
            last_completed,
            None,
            gap(),
            None,
            at(12, 0, 0),
        ) else {
            panic!("expected a window");
        };
        assert_eq!(window.on_or_after, ms(at(10, 10, 0), 2));
    }

    #[test]
    fn max_time_reached_is_terminal() {
        let last_completed = Some(Window::new(at(0, 55, 0), at(1, 0, 0)));
        let result = advance(
            &[],
            last_completed,
            Some(at(0, 0, 0)),
            gap(),
            Some(at(1, 0, 0)),
            at(2, 0, 0),
        );
        assert_eq!(result, Advance::Done);
    }

    #[test]
    fn max_time_clamps_the_final_window() {
        let last_completed = Some(Window::new(at(0, 52, 0), at(0, 57, 0)));
        let Advance::Window(window) = advance(
            &[],
            last_completed,
            Some(at(0, 0, 0)),
            gap(),
            Some(at(1, 0, 0)),
            at(2, 0, 0),
        ) else {
            panic!("expected a window");
        };

        assert_eq!(window.on_or_after, ms(at(0, 57, 0), 1));
        assert_eq!(window.on_or_before, at(1, 0, 0));
    }

    #[test]
    fn terminal_exactly_when_after_reaches_max_time() {
        // The window before the boundary was clamped to end at max_time.
        let last_completed = Some(Window::new(ms(at(0, 57, 0), 1), at(1, 0, 0)));
        let result = advance(
            &[],
            last_completed,
            Some(at(0, 0, 0)),
            gap(),
            Some(at(1, 0, 0)),
            at(2, 0, 0),
        );
        assert_eq!(result, Advance::Done);
    }

    #[test]
    fn safe_now_clamps_the_upper_bound() {
        let last_completed = Some(Window::new(at(11, 40, 0), at(11, 43, 0)));
        let safe_now = at(11, 45, 0);

        let Advance::Window(window) = advance(
            &[],
            last_completed,
            None,
            gap(),
            None,
            safe_now,
        ) else {
            panic!("expected a window");
        };

        assert_eq!(window.on_or_after, ms(at(11, 43, 0), 1));
        assert_eq!(window.on_or_before, safe_now);
    }

    #[test]
    fn clamp_can_produce_an_inverted_window() {
        // Ticks can outrun the readiness gap; the caller issues the window
        // anyway and simply gets an empty batch.
        let last_completed = Some(Window::new(at(11, 40, 0), at(11, 50, 0)));
        let safe_now = at(11, 45, 0);

        let Advance::Window(window) = advance(
            &[],
            last_completed,
            None,
            gap(),
            None,
            safe_now,
        ) else {
            panic!("expected a window");
        };
        assert_eq!(window.on_or_before, safe_now);
        assert!(window.on_or_before < window.on_or_after);
    }
}
