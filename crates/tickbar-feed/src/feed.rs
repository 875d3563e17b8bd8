//! Append-only bar sequence for one feed.
//!
//! Written only by the feed's aggregator (through `apply`) and read by
//! everything downstream. The current-index cursor is moved only by the
//! synchronizer.

use crate::aggregator::BarUpdate;
use tickbar_core::{Bar, FeedId};

/// One feed's bars plus its synchronized cursor.
#[derive(Debug, Clone)]
pub struct Feed {
    id: FeedId,
    name: String,
    bars: Vec<Bar>,
    /// Last bar is an in-progress replay bar.
    last_open: bool,
    cursor: Option<usize>,
    stalled: bool,
}

impl Feed {
    pub fn new(id: FeedId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bars: Vec::new(),
            last_open: false,
            cursor: None,
            stalled: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> FeedId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Every bar produced so far, including an in-progress replay bar.
    #[must_use]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[must_use]
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Whether the last bar may still change (replay only).
    #[must_use]
    pub fn is_last_open(&self) -> bool {
        self.last_open
    }

    /// Current bar index as of the latest primary advance.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Current bar, or `None` when the feed has no bar at or before the
    /// primary's current timestamp yet.
    #[must_use]
    pub fn current(&self) -> Option<&Bar> {
        self.cursor.and_then(|i| self.bars.get(i))
    }

    /// Bars up to and including the current one.
    #[must_use]
    pub fn history(&self) -> &[Bar] {
        match self.cursor {
            Some(i) => &self.bars[..=i],
            None => &[],
        }
    }

    /// Source is disconnected; the current bar stays at its last value.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub(crate) fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub(crate) fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor;
    }

    /// Apply an aggregator update to the bar sequence.
    pub(crate) fn apply(&mut self, update: &BarUpdate) {
        match update {
            BarUpdate::Closed(bar) => {
                self.bars.push(bar.clone());
                self.last_open = false;
            }
            BarUpdate::Opened(bar) => {
                self.bars.push(bar.clone());
                self.last_open = true;
            }
            BarUpdate::Updated(bar) => {
                if let (true, Some(last)) = (self.last_open, self.bars.last_mut()) {
                    *last = bar.clone();
                } else {
                    self.bars.push(bar.clone());
                    self.last_open = true;
                }
            }
            BarUpdate::Frozen => self.last_open = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tickbar_core::{Price, RawEvent, Size};

    fn bar(secs: i64, close: rust_decimal::Decimal) -> Bar {
        let ev = RawEvent::tick(
            Utc.timestamp_opt(secs, 0).unwrap(),
            Price::new(close),
            Size::new(dec!(1)),
        );
        Bar::from_event(&ev).unwrap()
    }

    #[test]
    fn test_empty_feed_has_no_current() {
        let feed = Feed::new(FeedId::new(1), "ES");
        assert!(feed.current().is_none());
        assert!(feed.history().is_empty());
        assert_eq!(feed.name(), "ES");
    }

    #[test]
    fn test_replay_updates_overwrite() {
        let mut feed = Feed::new(FeedId::PRIMARY, "ES");
        feed.apply(&BarUpdate::Opened(bar(0, dec!(100))));
        feed.apply(&BarUpdate::Updated(bar(0, dec!(101))));
        assert_eq!(feed.len(), 1);
        assert!(feed.is_last_open());

        feed.apply(&BarUpdate::Opened(bar(3, dec!(102))));
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.bars()[0].close.inner(), dec!(101));

        feed.apply(&BarUpdate::Frozen);
        assert!(!feed.is_last_open());
    }

    #[test]
    fn test_history_follows_cursor() {
        let mut feed = Feed::new(FeedId::PRIMARY, "ES");
        for s in 0..3 {
            feed.apply(&BarUpdate::Closed(bar(s, dec!(100))));
        }
        feed.set_cursor(Some(1));
        assert_eq!(feed.history().len(), 2);
        assert_eq!(feed.current().map(|b| b.timestamp.timestamp()), Some(1));
    }
}
