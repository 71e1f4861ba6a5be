//! MQTT topic-filter matching and the filter → sink routing table.

use crate::{InboundMessage, MessageSink};

/// Returns `true` if `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level (which may be empty) and `#` matches the
/// rest of the topic, including its parent level. Wildcards at the first
/// level never match topics starting with `$`.
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && filter.starts_with(['+', '#']) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Filter → sink table shared by transport implementations.
///
/// One sink per filter: subscribing an existing filter again replaces its
/// sink, as a broker would replace the subscription.
#[derive(Debug, Default)]
pub(crate) struct Routes {
    entries: Vec<(String, MessageSink)>,
}

impl Routes {
    pub(crate) fn insert(&mut self, filter: &str, sink: MessageSink) {
        match self.entries.iter_mut().find(|(f, _)| f == filter) {
            Some(entry) => entry.1 = sink,
            None => self.entries.push((filter.to_string(), sink)),
        }
    }

    pub(crate) fn remove(&mut self, filter: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(f, _)| f != filter);
        self.entries.len() != before
    }

    pub(crate) fn filters(&self) -> Vec<String> {
        self.entries.iter().map(|(f, _)| f.clone()).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sends `message` to every distinct sink with a matching filter and
    /// returns how many sinks received it.
    ///
    /// Sinks whose receiver is gone are dropped from the table.
    pub(crate) fn deliver(&mut self, message: &InboundMessage) -> usize {
        let mut delivered: Vec<MessageSink> = Vec::new();
        self.entries.retain(|(filter, sink)| {
            if sink.is_closed() {
                tracing::debug!(%filter, "dropping route with closed sink");
                return false;
            }
            if matches(filter, &message.topic)
                && !delivered.iter().any(|d| d.same_channel(sink))
                && sink.send(message.clone()).is_ok()
            {
                delivered.push(sink.clone());
            }
            true
        });
        delivered.len()
    }
}
