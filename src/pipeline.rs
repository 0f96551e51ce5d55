//! Key interception pipeline.
//!
//! [`KeyInterceptor::classify`] is called synchronously from the keyboard
//! hook for every physical key transition. It decides whether the key is
//! swallowed and hands any follow-up work to the action worker.

use crate::error::Error;
use crate::event::{Decision, MouseAction, QueuedAction};
use crate::keycode::{canonical_key_id, is_modifier_id};
use crate::worker::ActionSender;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Key id to mouse action table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapping {
    entries: HashMap<Arc<str>, MouseAction>,
}

impl KeyMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(key name, action name)` pairs.
    ///
    /// Entries with an unknown action or a modifier key are skipped with a
    /// warning.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut mapping = Self::new();
        for (key, action_name) in entries {
            let Some(action) = MouseAction::from_name(action_name) else {
                log::warn!(
                    "{}",
                    Error::MalformedConfiguration(format!(
                        "unknown action {:?} for key {:?}",
                        action_name, key
                    ))
                );
                continue;
            };
            if let Err(e) = mapping.insert(key, action) {
                log::warn!("{}", e);
            }
        }
        mapping
    }

    /// Map a key to an action, replacing any previous action.
    pub fn insert(&mut self, key: &str, action: MouseAction) -> Result<(), Error> {
        let id = canonical_key_id(key);
        if id.is_empty() {
            return Err(Error::MalformedConfiguration("empty key name".into()));
        }
        if is_modifier_id(&id) {
            return Err(Error::MalformedConfiguration(format!(
                "modifier {:?} cannot be mapped",
                key
            )));
        }
        self.entries.insert(Arc::from(id), action);
        Ok(())
    }

    /// Look up the action of a canonical key id.
    pub fn get(&self, id: &str) -> Option<MouseAction> {
        self.entries.get(id).copied()
    }

    fn get_key_value(&self, id: &str) -> Option<(&Arc<str>, &MouseAction)> {
        self.entries.get_key_value(id)
    }

    /// Number of mapped keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key id, action)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MouseAction)> {
        self.entries.iter().map(|(k, a)| (k.as_ref(), *a))
    }
}

struct Inner {
    mapping: Arc<KeyMapping>,
    exit_on_unmapped: bool,
    /// Suppressed keys awaiting release, with the action they pressed.
    held: HashMap<Arc<str>, MouseAction>,
}

/// Classifies key transitions while the layer is active.
pub struct KeyInterceptor {
    layer_active: AtomicBool,
    inner: Mutex<Inner>,
    queue: ActionSender,
}

impl KeyInterceptor {
    /// Create an interceptor feeding `queue`; the layer starts inactive.
    pub fn new(mapping: KeyMapping, exit_on_unmapped: bool, queue: ActionSender) -> Self {
        Self {
            layer_active: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                mapping: Arc::new(mapping),
                exit_on_unmapped,
                held: HashMap::new(),
            }),
            queue,
        }
    }

    /// Decide what happens to one physical key transition.
    ///
    /// Never panics; internal failures degrade to [`Decision::PassThrough`].
    pub fn classify(&self, key_id: &str, is_press: bool) -> Decision {
        if !self.layer_active.load(Ordering::Acquire) {
            return Decision::PassThrough;
        }

        match catch_unwind(AssertUnwindSafe(|| self.classify_active(key_id, is_press))) {
            Ok(decision) => decision,
            Err(_) => {
                log::error!("Key classification panicked for {:?}", key_id);
                Decision::PassThrough
            }
        }
    }

    fn classify_active(&self, key_id: &str, is_press: bool) -> Decision {
        // Hooks already report lower-case ids.
        let id: Cow<'_, str> = if key_id.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(key_id.to_ascii_lowercase())
        } else {
            Cow::Borrowed(key_id)
        };

        if is_modifier_id(&id) {
            return Decision::PassThrough;
        }

        let Ok(mut inner) = self.inner.lock() else {
            log::error!("Key pipeline lock poisoned");
            return Decision::PassThrough;
        };
        // The flag only changes under this lock; the layer may have ended
        // since the unlocked check in `classify`.
        if !self.layer_active.load(Ordering::Acquire) {
            return Decision::PassThrough;
        }

        if is_press {
            if inner.held.contains_key(id.as_ref()) {
                return Decision::Suppress;
            }

            let mapping = inner.mapping.clone();
            match mapping.get_key_value(&id) {
                Some((key, action)) => {
                    inner.held.insert(key.clone(), *action);
                    self.queue.send(QueuedAction::Press {
                        key: key.clone(),
                        action: *action,
                    });
                    Decision::Suppress
                }
                None => {
                    if inner.exit_on_unmapped {
                        self.queue.send(QueuedAction::Unmapped {
                            key: Arc::from(id.as_ref()),
                        });
                    }
                    Decision::PassThrough
                }
            }
        } else {
            // Releases what the press pressed, even across a reload.
            let Some((key, action)) = inner.held.remove_entry(id.as_ref()) else {
                return Decision::PassThrough;
            };
            self.queue.send(QueuedAction::Release { key, action });
            Decision::Suppress
        }
    }

    /// Follow the layer state. Leaving the layer forgets held keys.
    pub fn set_layer_active(&self, active: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if !active && !inner.held.is_empty() {
                log::debug!("Dropping {} held key(s)", inner.held.len());
                inner.held.clear();
            }
            self.layer_active.store(active, Ordering::Release);
        }
    }

    /// Check the cached layer flag.
    pub fn is_layer_active(&self) -> bool {
        self.layer_active.load(Ordering::Acquire)
    }

    /// Swap in a new mapping and exit policy.
    pub fn reload(&self, mapping: KeyMapping, exit_on_unmapped: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if *inner.mapping != mapping {
                log::info!("Key mapping reloaded ({} keys)", mapping.len());
            }
            inner.mapping = Arc::new(mapping);
            inner.exit_on_unmapped = exit_on_unmapped;
        }
    }

    /// Snapshot of the currently held key ids.
    pub fn held_keys(&self) -> Vec<String> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = inner.held.keys().map(|k| k.to_string()).collect();
        keys.sort();
        keys
    }

    /// The mapping currently in effect.
    pub fn mapping(&self) -> Arc<KeyMapping> {
        self.inner
            .lock()
            .map(|inner| inner.mapping.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::action_queue;
    use std::sync::mpsc::Receiver;

    fn setup(exit_on_unmapped: bool) -> (KeyInterceptor, Receiver<QueuedAction>) {
        let mapping = KeyMapping::from_entries([("f", "mouse_left_click"), ("u", "mouse_scroll_up")]);
        let (tx, rx) = action_queue();
        let interceptor = KeyInterceptor::new(mapping, exit_on_unmapped, tx);
        interceptor.set_layer_active(true);
        (interceptor, rx)
    }

    fn drain(rx: &Receiver<QueuedAction>) -> Vec<QueuedAction> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_inactive_layer_passes_everything() {
        let (interceptor, rx) = setup(true);
        interceptor.set_layer_active(false);

        assert_eq!(interceptor.classify("f", true), Decision::PassThrough);
        assert_eq!(interceptor.classify("z", true), Decision::PassThrough);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_press_repeat_release_repress() {
        let (interceptor, rx) = setup(false);
        let press = QueuedAction::Press {
            key: "f".into(),
            action: MouseAction::LeftClick,
        };
        let release = QueuedAction::Release {
            key: "f".into(),
            action: MouseAction::LeftClick,
        };

        assert_eq!(interceptor.classify("f", true), Decision::Suppress);
        assert_eq!(interceptor.classify("f", true), Decision::Suppress);
        assert_eq!(interceptor.classify("f", true), Decision::Suppress);
        assert_eq!(drain(&rx), vec![press.clone()]);
        assert_eq!(interceptor.held_keys(), vec!["f"]);

        assert_eq!(interceptor.classify("f", false), Decision::Suppress);
        assert_eq!(drain(&rx), vec![release]);
        assert!(interceptor.held_keys().is_empty());

        assert_eq!(interceptor.classify("f", true), Decision::Suppress);
        assert_eq!(drain(&rx), vec![press]);
    }

    #[test]
    fn test_uppercase_ids_match() {
        let (interceptor, rx) = setup(false);
        assert_eq!(interceptor.classify("F", true), Decision::Suppress);
        assert_eq!(interceptor.classify("f", false), Decision::Suppress);
        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn test_unmapped_key_requests_exit() {
        let (interceptor, rx) = setup(true);
        assert_eq!(interceptor.classify("z", true), Decision::PassThrough);
        assert_eq!(interceptor.classify("z", false), Decision::PassThrough);
        assert_eq!(drain(&rx), vec![QueuedAction::Unmapped { key: "z".into() }]);

        let (quiet, rx) = setup(false);
        assert_eq!(quiet.classify("z", true), Decision::PassThrough);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_modifiers_always_pass() {
        let (interceptor, rx) = setup(true);
        for id in ["shift_left", "shift_right", "ctrl_left", "alt_right", "meta_left"] {
            assert_eq!(interceptor.classify(id, true), Decision::PassThrough);
            assert_eq!(interceptor.classify(id, false), Decision::PassThrough);
        }
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_modifiers_cannot_be_mapped() {
        let mapping = KeyMapping::from_entries([("shift", "mouse_left_click"), ("j", "bogus")]);
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_unmatched_release_passes() {
        let (interceptor, rx) = setup(true);
        // Pressed before the layer came up.
        assert_eq!(interceptor.classify("f", false), Decision::PassThrough);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_deactivation_clears_held_keys() {
        let (interceptor, rx) = setup(true);
        interceptor.classify("f", true);
        interceptor.set_layer_active(false);
        assert!(interceptor.held_keys().is_empty());

        interceptor.set_layer_active(true);
        assert_eq!(interceptor.classify("f", false), Decision::PassThrough);
        assert_eq!(drain(&rx).len(), 1);
    }

    #[test]
    fn test_identical_reload_is_unobservable() {
        let (interceptor, rx) = setup(false);
        interceptor.classify("f", true);

        let same = KeyMapping::from_entries([("f", "mouse_left_click"), ("u", "mouse_scroll_up")]);
        interceptor.reload(same, false);

        assert_eq!(interceptor.held_keys(), vec!["f"]);
        assert_eq!(interceptor.classify("f", true), Decision::Suppress);
        assert_eq!(interceptor.classify("f", false), Decision::Suppress);
        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn test_release_after_mapping_removed() {
        let (interceptor, rx) = setup(false);
        interceptor.classify("f", true);
        assert_eq!(drain(&rx).len(), 1);
        interceptor.reload(KeyMapping::new(), false);

        assert_eq!(interceptor.classify("f", false), Decision::Suppress);
        assert_eq!(
            drain(&rx),
            vec![QueuedAction::Release {
                key: Arc::from("f"),
                action: MouseAction::LeftClick,
            }]
        );
        assert!(interceptor.held_keys().is_empty());
    }

    #[test]
    fn test_no_held_keys_while_inactive_under_contention() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        let (interceptor, _rx) = setup(false);
        let interceptor = Arc::new(interceptor);
        let done = Arc::new(AtomicBool::new(false));

        let typist = {
            let interceptor = interceptor.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    interceptor.classify("f", true);
                    interceptor.classify("f", false);
                }
            })
        };

        let mut violations = 0;
        for _ in 0..20_000 {
            interceptor.set_layer_active(true);
            interceptor.set_layer_active(false);
            if !interceptor.held_keys().is_empty() {
                violations += 1;
            }
        }
        done.store(true, Ordering::SeqCst);
        typist.join().unwrap();

        assert_eq!(violations, 0);
        assert!(!interceptor.is_layer_active());
        assert!(interceptor.held_keys().is_empty());
    }
}
