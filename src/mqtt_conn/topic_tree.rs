// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Topic routing tree.
//!
//! Subscriptions live in a trie keyed by topic-filter level. `+` matches
//! exactly one level, `#` matches any number of trailing levels and is only
//! valid as the final segment. Mutation goes through [`Transaction`]s so a
//! multi-filter SUBSCRIBE or UNSUBSCRIBE becomes visible all at once when
//! its ack arrives, or not at all.

use std::collections::HashMap;

use tracing::trace;

use crate::mqtt_conn::packet::QoS;

/// Callback invoked for every received PUBLISH whose topic matches the
/// subscription's filter. Receives the concrete topic and the payload.
pub type PublishHandler = Box<dyn FnMut(&str, &[u8]) + Send>;

/// A subscription slot at a trie terminus. The handler closure owns any
/// user state; dropping the slot releases it.
pub struct Subscription {
    pub qos: QoS,
    pub handler: PublishHandler,
}

#[derive(Default)]
struct TopicNode {
    children: HashMap<String, TopicNode>,
    /// Set iff this node is a subscription terminus; holds the full filter.
    filter: Option<String>,
    subscription: Option<Subscription>,
}

impl TopicNode {
    fn is_prunable(&self) -> bool {
        self.subscription.is_none() && self.children.is_empty()
    }
}

enum Action {
    Insert {
        filter: String,
        qos: QoS,
        handler: PublishHandler,
    },
    Remove {
        filter: String,
    },
}

/// A staged list of tree mutations. Apply with [`TopicTree::commit`], or
/// discard with [`Transaction::rollback`] (dropping is equivalent); staged
/// handlers and their captured state are released without touching the tree.
#[derive(Default)]
pub struct Transaction {
    actions: Vec<Action>,
}

impl Transaction {
    pub fn insert(&mut self, filter: impl Into<String>, qos: QoS, handler: PublishHandler) {
        self.actions.push(Action::Insert {
            filter: filter.into(),
            qos,
            handler,
        });
    }

    pub fn remove(&mut self, filter: impl Into<String>) {
        self.actions.push(Action::Remove {
            filter: filter.into(),
        });
    }

    /// Discard the staged actions.
    pub fn rollback(self) {}
}

/// Returns true if `filter` is a well-formed topic filter: `#` only as the
/// whole final level, `+` only as a whole level. [MQTT-4.7.1]
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        match *level {
            "#" if i != last => return false,
            "#" | "+" => {}
            l if l.contains('#') || l.contains('+') => return false,
            _ => {}
        }
    }
    true
}

#[derive(Default)]
pub struct TopicTree {
    root: TopicNode,
}

impl TopicTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an empty transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::default()
    }

    /// Apply every staged action, in order. Runs synchronously on the
    /// owning task, so concurrent dispatch observes all of the actions or
    /// none of them.
    pub fn commit(&mut self, transaction: Transaction) {
        for action in transaction.actions {
            match action {
                Action::Insert {
                    filter,
                    qos,
                    handler,
                } => self.insert(filter, qos, handler),
                Action::Remove { filter } => self.remove(&filter),
            }
        }
    }

    /// Insert a subscription, replacing (and dropping) any existing slot for
    /// the same filter. Empty levels (`a//b`) are legal and distinct.
    fn insert(&mut self, filter: String, qos: QoS, handler: PublishHandler) {
        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        trace!(filter = %filter, replaced = node.subscription.is_some(), "subscription inserted");
        node.filter = Some(filter);
        node.subscription = Some(Subscription { qos, handler });
    }

    /// Remove the subscription registered for exactly `filter`, pruning any
    /// branch left without a terminus.
    fn remove(&mut self, filter: &str) {
        let levels: Vec<&str> = filter.split('/').collect();
        Self::remove_level(&mut self.root, &levels);
    }

    fn remove_level(node: &mut TopicNode, levels: &[&str]) {
        let Some((level, rest)) = levels.split_first() else {
            node.filter = None;
            node.subscription = None;
            return;
        };
        if let Some(child) = node.children.get_mut(*level) {
            Self::remove_level(child, rest);
            if child.is_prunable() {
                node.children.remove(*level);
            }
        }
    }

    /// Fire every subscription matching `topic` exactly once, handing it the
    /// full topic and payload. The topic must not contain wildcards.
    ///
    /// Returns the number of subscriptions fired.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8]) -> usize {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut matched = Vec::new();
        Self::collect_matches(&self.root, &levels, &mut matched);

        let fired = matched.len();
        for filter in matched {
            if let Some(subscription) = self.subscription_mut(&filter) {
                (subscription.handler)(topic, payload);
            }
        }
        fired
    }

    /// Walk one trie level, exploring children in the order: exact segment,
    /// `+`, `#`. A `#` terminus matches regardless of the remaining levels,
    /// including zero of them.
    fn collect_matches(node: &TopicNode, levels: &[&str], matched: &mut Vec<String>) {
        let Some((level, rest)) = levels.split_first() else {
            if node.subscription.is_some() {
                if let Some(filter) = &node.filter {
                    matched.push(filter.clone());
                }
            }
            if let Some(hash) = node.children.get("#") {
                if hash.subscription.is_some() {
                    if let Some(filter) = &hash.filter {
                        matched.push(filter.clone());
                    }
                }
            }
            return;
        };

        if let Some(child) = node.children.get(*level) {
            Self::collect_matches(child, rest, matched);
        }
        if let Some(child) = node.children.get("+") {
            Self::collect_matches(child, rest, matched);
        }
        if let Some(child) = node.children.get("#") {
            if child.subscription.is_some() {
                if let Some(filter) = &child.filter {
                    matched.push(filter.clone());
                }
            }
        }
    }

    fn subscription_mut(&mut self, filter: &str) -> Option<&mut Subscription> {
        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = node.children.get_mut(level)?;
        }
        node.subscription.as_mut()
    }

    /// Drop every subscription and node, releasing handler state.
    pub fn clear(&mut self) {
        self.root = TopicNode::default();
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        fn count(node: &TopicNode) -> usize {
            node.children.values().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }
}
