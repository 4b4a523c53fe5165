// src/tracking.rs - Persistent hand identities with appear/disappear hysteresis
use nalgebra::Point3;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::landmarks::{DecodedHand, LANDMARKS_COUNT, WRIST};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// Matched this frame.
    Tracked { landmarks: [Point3<f32>; LANDMARKS_COUNT] },
    /// Unmatched this frame. Holds no landmarks, so proximity matching
    /// skips the slot until it is matched again.
    NotTracked,
}

/// Edge produced by a slot update. `Appeared` and `Disappeared` fire once
/// per hysteresis-gated change of `is_currently_tracked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Appeared,
    Disappeared,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct HandSlot {
    id: SlotId,
    state: SlotState,
    consecutive_tracked: u32,
    consecutive_untracked: u32,
    is_currently_tracked: bool,
    appear_after: u32,
    disappear_after: u32,
}

impl HandSlot {
    pub fn new(id: SlotId, config: &TrackerConfig) -> Self {
        Self {
            id,
            state: SlotState::NotTracked,
            consecutive_tracked: 0,
            consecutive_untracked: 0,
            is_currently_tracked: false,
            appear_after: config.appear_after_frames,
            disappear_after: config.disappear_after_frames,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn is_currently_tracked(&self) -> bool {
        self.is_currently_tracked
    }

    /// This frame's landmarks, if the slot was matched.
    pub fn landmarks(&self) -> Option<&[Point3<f32>; LANDMARKS_COUNT]> {
        match &self.state {
            SlotState::Tracked { landmarks } => Some(landmarks),
            SlotState::NotTracked => None,
        }
    }

    /// Wrist position from this frame's match, `None` if unmatched.
    pub fn last_anchor(&self) -> Option<Point3<f32>> {
        self.landmarks().map(|landmarks| landmarks[WRIST])
    }

    pub fn update_tracking(&mut self, hand: &DecodedHand) -> Transition {
        self.consecutive_untracked = 0;
        self.consecutive_tracked += 1;
        self.state = SlotState::Tracked {
            landmarks: hand.landmarks,
        };

        if !self.is_currently_tracked && self.consecutive_tracked > self.appear_after {
            self.is_currently_tracked = true;
            return Transition::Appeared;
        }
        Transition::Unchanged
    }

    pub fn update_not_tracking(&mut self) -> Transition {
        self.consecutive_tracked = 0;
        self.consecutive_untracked += 1;
        self.state = SlotState::NotTracked;

        if self.is_currently_tracked && self.consecutive_untracked > self.disappear_after {
            self.is_currently_tracked = false;
            return Transition::Disappeared;
        }
        Transition::Unchanged
    }
}

/// Outcome of matching one frame's detections against the slot pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameUpdate {
    /// One entry per slot, in slot order.
    pub transitions: Vec<(SlotId, Transition)>,
    pub matched: usize,
    /// Detections that found no slot and were dropped.
    pub surplus: usize,
}

/// Which detection (by index) each slot receives this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub slot_to_hand: Vec<Option<usize>>,
    pub surplus: usize,
}

/// Greedy two-phase matching. Phase A keeps identities by giving each
/// detection, in order, the nearest unmatched slot that was matched last
/// frame, if closer than `max_distance`. Phase B hands leftovers to unmatched slots
/// that are not currently tracked, first come first served.
pub fn match_hands(slots: &[&HandSlot], hands: &[DecodedHand], max_distance: f32) -> Assignment {
    let mut slot_to_hand: Vec<Option<usize>> = vec![None; slots.len()];
    let mut hand_matched = vec![false; hands.len()];

    for (h, hand) in hands.iter().enumerate() {
        let anchor = hand.anchor();
        let closest = slots
            .iter()
            .enumerate()
            .filter(|(s, _)| slot_to_hand[*s].is_none())
            .filter_map(|(s, slot)| slot.last_anchor().map(|a| (s, (a - anchor).norm())))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((s, distance)) = closest {
            if distance < max_distance {
                slot_to_hand[s] = Some(h);
                hand_matched[h] = true;
            }
        }
    }

    let mut surplus = 0;
    for h in (0..hands.len()).filter(|&h| !hand_matched[h]) {
        let free = (0..slots.len())
            .find(|&s| slot_to_hand[s].is_none() && !slots[s].is_currently_tracked());
        match free {
            Some(s) => slot_to_hand[s] = Some(h),
            None => surplus += 1,
        }
    }

    Assignment { slot_to_hand, surplus }
}

/// Applies matching results to a pool of slots.
pub struct IdentityTracker {
    max_distance: f32,
}

impl IdentityTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            max_distance: config.match_distance,
        }
    }

    pub fn update<'a, I>(&self, slots: I, hands: &[DecodedHand]) -> FrameUpdate
    where
        I: IntoIterator<Item = &'a mut HandSlot>,
    {
        let mut slots: Vec<&mut HandSlot> = slots.into_iter().collect();
        let assignment = {
            let view: Vec<&HandSlot> = slots.iter().map(|s| &**s).collect();
            match_hands(&view, hands, self.max_distance)
        };

        let mut update = FrameUpdate {
            surplus: assignment.surplus,
            ..FrameUpdate::default()
        };

        for (slot, assigned) in slots.iter_mut().zip(&assignment.slot_to_hand) {
            let transition = match assigned {
                Some(h) => {
                    update.matched += 1;
                    slot.update_tracking(&hands[*h])
                }
                None => slot.update_not_tracking(),
            };
            if transition != Transition::Unchanged {
                debug!("Slot {} -> {:?}", slot.id().0, transition);
            }
            update.transitions.push((slot.id(), transition));
        }

        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Handedness;

    fn hand_at(x: f32, y: f32, z: f32) -> DecodedHand {
        let mut landmarks = [Point3::new(x, y, z); LANDMARKS_COUNT];
        for (i, p) in landmarks.iter_mut().enumerate().skip(1) {
            p.y += 0.01 * i as f32;
        }
        DecodedHand {
            landmarks,
            handedness: Handedness::Right,
            score: 1.0,
        }
    }

    fn pool() -> Vec<HandSlot> {
        let config = TrackerConfig::default();
        (0..config.max_hands).map(|i| HandSlot::new(SlotId(i), &config)).collect()
    }

    #[test]
    fn appears_on_fourth_consecutive_match() {
        let mut slot = HandSlot::new(SlotId(0), &TrackerConfig::default());
        let hand = hand_at(0.0, 0.0, 0.0);
        for _ in 0..3 {
            assert_eq!(slot.update_tracking(&hand), Transition::Unchanged);
        }
        assert_eq!(slot.update_tracking(&hand), Transition::Appeared);
        assert_eq!(slot.update_tracking(&hand), Transition::Unchanged);
        assert!(slot.is_currently_tracked());
    }

    #[test]
    fn disappears_on_sixth_consecutive_miss() {
        let mut slot = HandSlot::new(SlotId(0), &TrackerConfig::default());
        let hand = hand_at(0.0, 0.0, 0.0);
        for _ in 0..4 {
            slot.update_tracking(&hand);
        }
        for _ in 0..5 {
            assert_eq!(slot.update_not_tracking(), Transition::Unchanged);
            assert!(slot.is_currently_tracked());
        }
        assert_eq!(slot.update_not_tracking(), Transition::Disappeared);
        assert_eq!(slot.update_not_tracking(), Transition::Unchanged);
    }

    #[test]
    fn alternating_frames_never_transition() {
        let mut slot = HandSlot::new(SlotId(0), &TrackerConfig::default());
        let hand = hand_at(0.0, 0.0, 0.0);
        for _ in 0..50 {
            assert_eq!(slot.update_tracking(&hand), Transition::Unchanged);
            assert_eq!(slot.update_not_tracking(), Transition::Unchanged);
        }
        assert!(!slot.is_currently_tracked());
    }

    #[test]
    fn miss_clears_landmarks_and_anchor() {
        let mut slot = HandSlot::new(SlotId(0), &TrackerConfig::default());
        assert_eq!(slot.state(), &SlotState::NotTracked);
        assert_eq!(slot.last_anchor(), None);

        slot.update_tracking(&hand_at(0.5, 0.0, 0.0));
        assert!(matches!(slot.state(), SlotState::Tracked { .. }));
        assert_eq!(slot.last_anchor(), Some(Point3::new(0.5, 0.0, 0.0)));

        slot.update_not_tracking();
        assert_eq!(slot.state(), &SlotState::NotTracked);
        assert!(slot.landmarks().is_none());
        assert_eq!(slot.last_anchor(), None);
    }

    #[test]
    fn fresh_slots_only_fill_through_recovery() {
        let slots = pool();
        let view: Vec<&HandSlot> = slots.iter().collect();
        let assignment = match_hands(&view, &[hand_at(3.0, 0.0, 0.0)], 0.2);
        assert_eq!(assignment.slot_to_hand, vec![Some(0), None]);
        assert_eq!(assignment.surplus, 0);
    }

    #[test]
    fn nearest_slot_wins_regardless_of_detection_order() {
        let tracker = IdentityTracker::new(&TrackerConfig::default());
        let mut slots = pool();
        let a = hand_at(0.0, 0.0, 0.0);
        let b = hand_at(1.0, 0.0, 0.0);
        for _ in 0..4 {
            tracker.update(slots.iter_mut(), &[a.clone(), b.clone()]);
        }

        let a_moved = hand_at(0.05, 0.0, 0.0);
        let b_moved = hand_at(0.95, 0.0, 0.0);
        let update = tracker.update(slots.iter_mut(), &[b_moved, a_moved]);

        assert_eq!(update.matched, 2);
        assert!((slots[0].last_anchor().unwrap().x - 0.05).abs() < 1e-6);
        assert!((slots[1].last_anchor().unwrap().x - 0.95).abs() < 1e-6);
    }

    #[test]
    fn far_detection_recovers_untracked_slot() {
        let tracker = IdentityTracker::new(&TrackerConfig::default());
        let mut slots = pool();
        let a = hand_at(0.0, 0.0, 0.0);
        for _ in 0..4 {
            tracker.update(slots.iter_mut(), &[a.clone()]);
        }
        assert!(slots[0].is_currently_tracked());

        let update = tracker.update(slots.iter_mut(), &[a.clone(), hand_at(2.0, 0.0, 0.0)]);
        assert_eq!(update.matched, 2);
        assert!((slots[1].last_anchor().unwrap().x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn surplus_detections_are_counted_and_dropped() {
        let tracker = IdentityTracker::new(&TrackerConfig::default());
        let mut slots = pool();
        let hands = [
            hand_at(0.0, 0.0, 0.0),
            hand_at(1.0, 0.0, 0.0),
            hand_at(2.0, 0.0, 0.0),
        ];
        let update = tracker.update(slots.iter_mut(), &hands);
        assert_eq!(update.matched, 2);
        assert_eq!(update.surplus, 1);
    }

    #[test]
    fn tracked_slot_is_not_stolen_by_far_detection() {
        let tracker = IdentityTracker::new(&TrackerConfig::default());
        let mut slots = pool();
        for _ in 0..4 {
            tracker.update(
                slots.iter_mut(),
                &[hand_at(0.0, 0.0, 0.0), hand_at(1.0, 0.0, 0.0)],
            );
        }

        // Both slots currently tracked, the only detection is far from both
        let update = tracker.update(slots.iter_mut(), &[hand_at(5.0, 0.0, 0.0)]);
        assert_eq!(update.matched, 0);
        assert_eq!(update.surplus, 1);
        assert!(slots.iter().all(|s| s.is_currently_tracked()));
    }

    #[test]
    fn hand_after_single_dropout_goes_to_the_other_slot() {
        let tracker = IdentityTracker::new(&TrackerConfig::default());
        let mut slots = pool();
        let a = hand_at(0.0, 0.0, 0.0);
        for _ in 0..4 {
            tracker.update(slots.iter_mut(), &[a.clone()]);
        }
        tracker.update(slots.iter_mut(), &[]);
        assert!(slots[0].is_currently_tracked());
        assert_eq!(slots[0].last_anchor(), None);

        // Slot 0 has no landmarks for proximity and is still tracked, so
        // only slot 1 can take the returning hand
        let update = tracker.update(slots.iter_mut(), &[hand_at(0.02, 0.0, 0.0)]);
        assert_eq!(update.matched, 1);
        assert!(slots[0].landmarks().is_none());
        assert!((slots[1].last_anchor().unwrap().x - 0.02).abs() < 1e-6);
        assert!(slots[0].is_currently_tracked());
        assert!(!slots[1].is_currently_tracked());
    }
}
