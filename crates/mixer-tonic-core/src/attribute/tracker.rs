use super::codec::{decode, encode};
use crate::{Result, proto::Attributes};
use mixer::{Bag, Dictionary, MutableBag, ProtoBag};
use std::sync::Arc;

/// Per-stream attribute state.
///
/// Clients send attribute deltas: each message carries only what changed
/// since the previous one on the same stream. The tracker folds those deltas
/// into cumulative state and hands out a bag per request that sees
/// everything applied so far.
///
/// It also runs the same scheme in reverse for responses:
/// [`apply_bag`](Tracker::apply_bag) emits only the response attributes that
/// differ from what was last sent on the stream.
///
/// Cumulative state is an [`Arc<ProtoBag>`] updated copy-on-write, so a
/// request bag handed to a worker keeps a stable snapshot while the reading
/// side applies later deltas.
#[derive(Debug)]
pub struct Tracker {
    dictionary: Arc<Dictionary>,
    cumulative: Arc<ProtoBag>,
    sent: ProtoBag,
    current: Option<MutableBag>,
    released: bool,
}

impl Tracker {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            cumulative: Arc::new(ProtoBag::new()),
            sent: ProtoBag::new(),
            current: None,
            released: false,
        }
    }

    fn live(&self) {
        assert!(!self.released, "use of a released Tracker");
    }

    /// A snapshot of every attribute applied so far.
    pub fn cumulative(&self) -> Arc<ProtoBag> {
        Arc::clone(&self.cumulative)
    }

    /// Decodes `delta`, folds it into the cumulative state and returns a
    /// request-scoped bag over the result.
    ///
    /// If `delta.reset_context` is set, earlier state is discarded first.
    /// The returned bag must be released with [`MutableBag::done`].
    ///
    /// # Errors
    ///
    /// Returns the decode error; cumulative state is untouched in that case.
    ///
    /// # Panics
    ///
    /// Panics if the tracker has been released.
    pub fn apply_proto(&mut self, delta: &Attributes) -> Result<MutableBag> {
        self.live();
        let decoded = decode(delta, &self.dictionary)?;

        let state = Arc::make_mut(&mut self.cumulative);
        if delta.reset_context {
            state.clear();
        }
        state.apply(&decoded);

        let snapshot: Arc<dyn Bag> = self.cumulative.clone();
        Ok(MutableBag::with_parent(snapshot))
    }

    /// Like [`apply_proto`](Tracker::apply_proto), but the tracker keeps the
    /// request bag until [`end_request`](Tracker::end_request).
    ///
    /// # Panics
    ///
    /// Panics if a request is already active or the tracker is released.
    pub fn start_request(&mut self, delta: &Attributes) -> Result<&MutableBag> {
        assert!(
            self.current.is_none(),
            "start_request called while a request is active"
        );
        let bag = self.apply_proto(delta)?;
        Ok(&*self.current.insert(bag))
    }

    /// Releases the bag opened by [`start_request`](Tracker::start_request).
    ///
    /// # Panics
    ///
    /// Panics if no request is active.
    pub fn end_request(&mut self) {
        let bag = self
            .current
            .take()
            .unwrap_or_else(|| panic!("end_request called without an active request"));
        bag.done();
    }

    /// Encodes the attributes of `bag` that changed since the previous call.
    ///
    /// Names whose value equals the last one sent are skipped; names sent
    /// before but missing from `bag` are emitted as deletions.
    ///
    /// # Panics
    ///
    /// Panics if the tracker has been released.
    pub fn apply_bag<B: Bag + ?Sized>(&mut self, bag: &B) -> Attributes {
        self.live();

        let mut names = Vec::new();
        let mut next = ProtoBag::new();
        for name in bag.names() {
            let Some(value) = bag.get(&name) else {
                continue;
            };
            if self.sent.value(&name) != Some(&value) {
                names.push(name.clone());
            }
            next.insert(name, value);
        }
        for (name, _) in self.sent.iter() {
            if !next.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort_unstable();

        let attrs = encode(&next, names.iter().map(String::as_str), &self.dictionary);
        self.sent = next;
        attrs
    }

    /// Releases the tracker's state, including an active request bag.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn done(&mut self) {
        assert!(!self.released, "Tracker::done called on a released tracker");
        self.released = true;
        if let Some(bag) = self.current.take() {
            bag.done();
        }
        self.cumulative = Arc::new(ProtoBag::new());
        self.sent.clear();
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixer::Value;

    fn dict() -> Arc<Dictionary> {
        Arc::new(Dictionary::new(["a", "b", "c", "x", "y"]))
    }

    fn int(name: i32, v: i64) -> Attributes {
        Attributes {
            int64s: [(name, v)].into(),
            ..Default::default()
        }
    }

    #[test]
    fn deltas_accumulate() {
        let mut t = Tracker::new(dict());

        let b1 = t.apply_proto(&int(0, 1)).unwrap();
        assert_eq!(b1.get("a"), Some(Value::from(1_i64)));

        let b2 = t.apply_proto(&int(1, 2)).unwrap();
        assert_eq!(b2.get("a"), Some(Value::from(1_i64)));
        assert_eq!(b2.get("b"), Some(Value::from(2_i64)));

        let b3 = t.apply_proto(&int(0, 10)).unwrap();
        assert_eq!(b3.get("a"), Some(Value::from(10_i64)));
        assert_eq!(b3.get("b"), Some(Value::from(2_i64)));

        // older request bags keep their snapshot
        assert_eq!(b1.get("a"), Some(Value::from(1_i64)));
        assert_eq!(b1.get("b"), None);

        for b in [b1, b2, b3] {
            b.done();
        }
        t.done();
    }

    #[test]
    fn request_writes_stay_local() {
        let mut t = Tracker::new(dict());
        let mut b = t.apply_proto(&int(0, 1)).unwrap();
        b.set("a", 99_i64);
        b.done();

        assert_eq!(t.cumulative().get("a"), Some(Value::from(1_i64)));
        t.done();
    }

    #[test]
    fn failed_decode_leaves_state_unchanged() {
        let mut t = Tracker::new(dict());
        t.apply_proto(&int(0, 1)).unwrap().done();
        let before = t.cumulative();

        let bad = Attributes {
            int64s: [(1, 5)].into(),
            bools: [(-3, true)].into(),
            ..Default::default()
        };
        assert!(t.apply_proto(&bad).is_err());
        assert_eq!(*t.cumulative(), *before);
        assert_eq!(t.cumulative().get("b"), None);
        t.done();
    }

    #[test]
    fn deletions_remove_from_cumulative_state() {
        let mut t = Tracker::new(dict());
        let first = Attributes {
            int64s: [(0, 1), (1, 2)].into(),
            ..Default::default()
        };
        t.apply_proto(&first).unwrap().done();

        let delta = Attributes {
            deleted_attributes: vec![0],
            ..Default::default()
        };
        let b = t.apply_proto(&delta).unwrap();
        assert_eq!(b.get("a"), None);
        assert_eq!(b.get("b"), Some(Value::from(2_i64)));
        assert_eq!(b.names(), vec!["b".to_string()]);
        b.done();
        t.done();
    }

    #[test]
    fn reset_context_discards_earlier_state() {
        let mut t = Tracker::new(dict());
        t.apply_proto(&int(0, 1)).unwrap().done();

        let delta = Attributes {
            int64s: [(2, 3)].into(),
            reset_context: true,
            ..Default::default()
        };
        let b = t.apply_proto(&delta).unwrap();
        assert_eq!(b.get("a"), None);
        assert_eq!(b.get("c"), Some(Value::from(3_i64)));
        b.done();
        t.done();
    }

    #[test]
    fn start_and_end_request() {
        let mut t = Tracker::new(dict());
        {
            let b = t.start_request(&int(3, 7)).unwrap();
            assert_eq!(b.get("x"), Some(Value::from(7_i64)));
        }
        t.end_request();

        let b = t.start_request(&int(4, 8)).unwrap();
        assert_eq!(b.get("x"), Some(Value::from(7_i64)));
        assert_eq!(b.get("y"), Some(Value::from(8_i64)));
        // done releases the open request
        t.done();
        assert!(t.is_released());
    }

    #[test]
    fn failed_start_request_leaves_no_active_request() {
        let mut t = Tracker::new(dict());
        let bad = Attributes {
            int64s: [(42, 1)].into(),
            ..Default::default()
        };
        assert!(t.start_request(&bad).is_err());
        t.start_request(&int(0, 1)).unwrap();
        t.end_request();
        t.done();
    }

    #[test]
    #[should_panic(expected = "active request")]
    fn end_request_without_start_panics() {
        let mut t = Tracker::new(dict());
        t.end_request();
    }

    #[test]
    fn response_deltas_carry_only_changes() {
        let d = dict();
        let mut t = Tracker::new(Arc::clone(&d));

        let mut resp = MutableBag::new();
        resp.set("a", 1_i64);
        resp.set("b", 2_i64);
        let first = t.apply_bag(&resp);
        let decoded = decode(&first, &d).unwrap();
        assert_eq!(decoded.len(), 2);

        // unchanged bag produces an empty delta
        assert_eq!(t.apply_bag(&resp), Attributes::default());

        resp.set("b", 20_i64);
        resp.delete("a");
        let second = t.apply_bag(&resp);
        assert_eq!(second.int64s.len(), 1);
        assert_eq!(second.int64s.get(&1), Some(&20));
        assert_eq!(second.deleted_attributes, vec![0]);

        resp.done();
        t.done();
    }

    #[test]
    fn response_deltas_apply_on_the_other_side() {
        let d = dict();
        let mut sender = Tracker::new(Arc::clone(&d));
        let mut receiver = Tracker::new(Arc::clone(&d));

        let mut resp = MutableBag::new();
        resp.set("a", "one");
        resp.set("custom", true);
        receiver.apply_proto(&sender.apply_bag(&resp)).unwrap().done();

        resp.delete("custom");
        resp.set("b", 2.5_f64);
        let b = receiver.apply_proto(&sender.apply_bag(&resp)).unwrap();

        let mut names = b.names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(b.get("a"), Some(Value::from("one")));

        b.done();
        resp.done();
        sender.done();
        receiver.done();
    }

    #[test]
    #[should_panic(expected = "released")]
    fn double_done_panics() {
        let mut t = Tracker::new(dict());
        t.done();
        t.done();
    }

    #[test]
    #[should_panic(expected = "released")]
    fn apply_after_done_panics() {
        let mut t = Tracker::new(dict());
        t.done();
        let _ = t.apply_proto(&Attributes::default());
    }
}
