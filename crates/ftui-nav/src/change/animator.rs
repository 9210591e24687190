#![forbid(unsafe_code)]

//! Frame-driven animated transitions.
//!
//! [`AnimatorChangeHandler`] owns the timing and interruption protocol of an
//! animated swap; the visual effect itself is an [`AnimationStyle`].
//!
//! # Phases
//!
//! ```text
//! Idle ──perform──▶ AwaitingLayout ──"to" laid out──▶ Running ──t≥1──▶ Done
//!   │                     │                              │
//!   └─────────────────────┴──── abort / immediate ───────┴──────────▶ Done
//! ```
//!
//! Start is deferred while the "to" view has no layout so the first frame
//! already knows its size. Both interruption signals are honored in every
//! phase, including the deferred one.
//!
//! # Invariants
//!
//! - Progress passed to the style is eased and lies in [0.0, 1.0].
//! - `complete()` is reached exactly once: natural end, abort, or immediate
//!   completion, whichever comes first.
//!
//! # Failure Modes
//!
//! - A zero duration completes during `perform_change`.
//! - Frames arriving after completion are ignored.

use std::fmt;

use serde_json::{Value, json};
use web_time::Duration;

use super::{ChangeContext, ChangeHandler, RestorableHandler};
use crate::controller::ControllerId;
use crate::error::Result;
use crate::view::{NodeId, ViewHost};

// ============================================================================
// Easing
// ============================================================================

/// Easing curve applied to linear animation progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    Linear,
    #[default]
    EaseOut,
    EaseIn,
    EaseInOut,
}

impl Easing {
    /// Apply the curve to `t` (clamped to 0.0..=1.0).
    #[must_use]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOut => {
                let inv = 1.0 - t;
                1.0 - inv * inv * inv
            }
            Self::EaseIn => t * t * t,
            Self::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let inv = -2.0 * t + 2.0;
                    1.0 - inv * inv * inv / 2.0
                }
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::EaseOut => "ease_out",
            Self::EaseIn => "ease_in",
            Self::EaseInOut => "ease_in_out",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Self::Linear),
            "ease_out" => Some(Self::EaseOut),
            "ease_in" => Some(Self::EaseIn),
            "ease_in_out" => Some(Self::EaseInOut),
            _ => None,
        }
    }
}

// ============================================================================
// Style
// ============================================================================

/// Visual effect driven by an [`AnimatorChangeHandler`].
pub trait AnimationStyle: fmt::Debug + Clone + Default + 'static {
    /// Type tag of the handler carrying this style.
    const TYPE_TAG: &'static str;

    /// Render the transition at eased `progress`.
    fn apply(
        &mut self,
        _host: &mut dyn ViewHost,
        _from: Option<NodeId>,
        _to: Option<NodeId>,
        _is_push: bool,
        _progress: f64,
    ) {
    }

    /// Undo any visual change left on the "from" view.
    fn reset_from_view(&mut self, _host: &mut dyn ViewHost, _from: NodeId) {}

    fn save_config(&self) -> Value {
        Value::Null
    }

    fn from_config(_config: &Value) -> Self {
        Self::default()
    }
}

/// Style with timing only and no visual effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedStyle;

impl AnimationStyle for TimedStyle {
    const TYPE_TAG: &'static str = "TimedAnimatorChangeHandler";
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimatorPhase {
    #[default]
    Idle,
    AwaitingLayout,
    Running {
        elapsed: Duration,
    },
    Done,
}

/// Animated swap with deferred start and interruption support.
#[derive(Debug, Clone)]
pub struct AnimatorChangeHandler<S: AnimationStyle = TimedStyle> {
    /// `None` uses the host default duration.
    duration: Option<Duration>,
    removes_from_view_on_push: bool,
    easing: Easing,
    style: S,
    phase: AnimatorPhase,
    canceled: bool,
    needs_immediate_completion: bool,
    completed: bool,
}

impl<S: AnimationStyle> Default for AnimatorChangeHandler<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: AnimationStyle> AnimatorChangeHandler<S> {
    #[must_use]
    pub fn new(style: S) -> Self {
        Self {
            duration: None,
            removes_from_view_on_push: true,
            easing: Easing::default(),
            style,
            phase: AnimatorPhase::Idle,
            canceled: false,
            needs_immediate_completion: false,
            completed: false,
        }
    }

    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn removes_from_view(mut self, removes: bool) -> Self {
        self.removes_from_view_on_push = removes;
        self
    }

    #[must_use]
    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    #[must_use]
    pub fn configured_duration(&self) -> Option<Duration> {
        self.duration
    }

    #[must_use]
    pub fn phase(&self) -> AnimatorPhase {
        self.phase
    }

    #[must_use]
    pub fn style(&self) -> &S {
        &self.style
    }

    fn fresh(&self) -> Self {
        Self {
            duration: self.duration,
            removes_from_view_on_push: self.removes_from_view_on_push,
            easing: self.easing,
            style: self.style.clone(),
            ..Self::new(S::default())
        }
    }

    fn complete(&mut self, cx: &mut ChangeContext<'_>) {
        self.phase = AnimatorPhase::Done;
        if !self.completed {
            self.completed = true;
            cx.complete();
        }
    }

    fn start(&mut self, cx: &mut ChangeContext<'_>) {
        if self.canceled {
            self.complete(cx);
            return;
        }
        if self.needs_immediate_completion {
            self.finish(cx);
            return;
        }
        let duration = self.duration.unwrap_or_else(|| cx.default_duration());
        if duration.is_zero() {
            self.finish(cx);
            return;
        }
        self.phase = AnimatorPhase::Running {
            elapsed: Duration::ZERO,
        };
        let (from, to, is_push) = (cx.from(), cx.to(), cx.is_push());
        self.style.apply(cx.host(), from, to, is_push, 0.0);
    }

    /// Jump to the end state and complete.
    fn finish(&mut self, cx: &mut ChangeContext<'_>) {
        let (from, to, is_push) = (cx.from(), cx.to(), cx.is_push());
        self.style.apply(cx.host(), from, to, is_push, 1.0);
        if !is_push || self.removes_from_view_on_push {
            cx.remove_from_view();
        }
        self.complete(cx);
        if is_push && let Some(from) = from {
            self.style.reset_from_view(cx.host(), from);
        }
    }

    /// Abandon the animation: restore "from", withdraw "to".
    fn cancel(&mut self, cx: &mut ChangeContext<'_>) {
        let container = cx.container();
        if let Some(from) = cx.from() {
            self.style.reset_from_view(cx.host(), from);
        }
        if let Some(to) = cx.to()
            && cx.host_ref().parent(to) == Some(container)
        {
            cx.host().remove_child(container, to);
        }
        self.complete(cx);
    }
}

impl<S: AnimationStyle> ChangeHandler for AnimatorChangeHandler<S> {
    fn type_tag(&self) -> &str {
        S::TYPE_TAG
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        if let Some(to) = cx.to()
            && cx.host_ref().parent(to).is_none()
        {
            cx.add_to_view();
            if !cx.host_ref().has_layout(to) {
                self.phase = AnimatorPhase::AwaitingLayout;
                return;
            }
        }
        self.start(cx);
    }

    fn on_frame(&mut self, dt: Duration, cx: &mut ChangeContext<'_>) {
        match self.phase {
            AnimatorPhase::AwaitingLayout => {
                if cx.to().is_none_or(|to| cx.host_ref().has_layout(to)) {
                    self.start(cx);
                }
            }
            AnimatorPhase::Running { elapsed } => {
                let elapsed = elapsed + dt;
                let total = self.duration.unwrap_or_else(|| cx.default_duration());
                let t = if total.is_zero() {
                    1.0
                } else {
                    elapsed.as_secs_f64() / total.as_secs_f64()
                };
                if t >= 1.0 {
                    self.finish(cx);
                } else {
                    self.phase = AnimatorPhase::Running { elapsed };
                    let (from, to, is_push) = (cx.from(), cx.to(), cx.is_push());
                    let eased = self.easing.apply(t);
                    self.style.apply(cx.host(), from, to, is_push, eased);
                }
            }
            AnimatorPhase::Idle | AnimatorPhase::Done => {}
        }
    }

    fn on_abort_push(
        &mut self,
        _new_handler: &dyn ChangeHandler,
        new_top: Option<&ControllerId>,
        cx: &mut ChangeContext<'_>,
    ) {
        let reversing = new_top.is_some() && new_top == cx.info().from_controller.as_ref();
        if !reversing {
            // Pushed over: the interrupted push lands in its end state.
            self.complete_immediately(cx);
            return;
        }
        self.canceled = true;
        match self.phase {
            AnimatorPhase::Running { .. } | AnimatorPhase::AwaitingLayout => self.cancel(cx),
            AnimatorPhase::Idle => self.complete(cx),
            AnimatorPhase::Done => {}
        }
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.needs_immediate_completion = true;
        match self.phase {
            AnimatorPhase::Running { .. } | AnimatorPhase::AwaitingLayout => self.finish(cx),
            AnimatorPhase::Idle | AnimatorPhase::Done => {}
        }
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.fresh())
    }

    fn save_config(&self) -> Value {
        let duration_ms = self
            .duration
            .map_or(-1, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        json!({
            "duration_ms": duration_ms,
            "removes_from_view_on_push": self.removes_from_view_on_push,
            "easing": self.easing.as_str(),
            "style": self.style.save_config(),
        })
    }
}

impl<S: AnimationStyle> RestorableHandler for AnimatorChangeHandler<S> {
    const TYPE_TAG: &'static str = S::TYPE_TAG;

    fn from_config(config: &Value) -> Result<Self> {
        let style = S::from_config(config.get("style").unwrap_or(&Value::Null));
        let mut handler = Self::new(style);
        handler.duration = config
            .get("duration_ms")
            .and_then(Value::as_i64)
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis);
        handler.removes_from_view_on_push = config
            .get("removes_from_view_on_push")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        handler.easing = config
            .get("easing")
            .and_then(Value::as_str)
            .and_then(Easing::parse)
            .unwrap_or_default();
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeInfo;
    use crate::view::MemoryViewTree;

    type Timed = AnimatorChangeHandler<TimedStyle>;

    struct Fixture {
        tree: MemoryViewTree,
        info: ChangeInfo,
    }

    impl Fixture {
        fn new(is_push: bool, auto_layout: bool) -> Self {
            let mut tree = MemoryViewTree::new().with_auto_layout(auto_layout);
            let container = tree.create_node(None);
            tree.attach_to_window(container);
            let from = tree.create_node(None);
            let to = tree.create_node(None);
            tree.add_child(container, from, None);
            let info = ChangeInfo {
                container,
                from: Some(from),
                to: Some(to),
                from_controller: Some(ControllerId::from("from")),
                to_controller: Some(ControllerId::from("to")),
                is_push,
                default_duration: Duration::from_millis(300),
            };
            Self { tree, info }
        }

        fn perform(&mut self, handler: &mut Timed) -> bool {
            let mut cx = ChangeContext::new(&mut self.tree, &self.info);
            handler.perform_change(&mut cx);
            cx.is_completed()
        }

        fn frame(&mut self, handler: &mut Timed, ms: u64) -> bool {
            let mut cx = ChangeContext::new(&mut self.tree, &self.info);
            handler.on_frame(Duration::from_millis(ms), &mut cx);
            cx.is_completed()
        }

        fn children(&self) -> Vec<NodeId> {
            self.tree.children(self.info.container).to_vec()
        }
    }

    #[test]
    fn easing_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert!((easing.apply(0.0)).abs() < 1e-9);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9);
            assert_eq!(Easing::parse(easing.as_str()), Some(easing));
        }
    }

    #[test]
    fn runs_to_completion_over_frames() {
        let mut fx = Fixture::new(true, true);
        let mut handler = Timed::default().duration(Duration::from_millis(100));
        assert!(!fx.perform(&mut handler));
        assert!(matches!(handler.phase(), AnimatorPhase::Running { .. }));
        assert!(!fx.frame(&mut handler, 50));
        assert!(fx.frame(&mut handler, 60));
        assert_eq!(fx.children(), vec![fx.info.to.unwrap()]);
        assert_eq!(handler.phase(), AnimatorPhase::Done);
    }

    #[test]
    fn zero_duration_completes_synchronously() {
        let mut fx = Fixture::new(true, true);
        let mut handler = Timed::default().duration(Duration::ZERO);
        assert!(fx.perform(&mut handler));
        assert_eq!(fx.children(), vec![fx.info.to.unwrap()]);
    }

    #[test]
    fn start_waits_for_layout() {
        let mut fx = Fixture::new(true, false);
        let mut handler = Timed::default().duration(Duration::from_millis(10));
        assert!(!fx.perform(&mut handler));
        assert_eq!(handler.phase(), AnimatorPhase::AwaitingLayout);
        assert!(!fx.frame(&mut handler, 100));
        assert_eq!(handler.phase(), AnimatorPhase::AwaitingLayout);

        let to = fx.info.to.unwrap();
        fx.tree.set_size(to, 4, 4);
        assert!(!fx.frame(&mut handler, 0));
        assert!(matches!(handler.phase(), AnimatorPhase::Running { .. }));
        assert!(fx.frame(&mut handler, 20));
    }

    #[test]
    fn immediate_completion_while_deferred_snaps_to_end() {
        let mut fx = Fixture::new(true, false);
        let mut handler = Timed::default();
        fx.perform(&mut handler);
        let mut cx = ChangeContext::new(&mut fx.tree, &fx.info);
        handler.complete_immediately(&mut cx);
        assert!(cx.is_completed());
        assert_eq!(fx.children(), vec![fx.info.to.unwrap()]);
    }

    #[test]
    fn abort_by_reversal_restores_from_view() {
        let mut fx = Fixture::new(true, true);
        let mut handler = Timed::default();
        fx.perform(&mut handler);
        let from_id = fx.info.from_controller.clone();
        let new_handler = Timed::default();
        let mut cx = ChangeContext::new(&mut fx.tree, &fx.info);
        handler.on_abort_push(&new_handler, from_id.as_ref(), &mut cx);
        assert!(cx.is_completed());
        assert_eq!(fx.children(), vec![fx.info.from.unwrap()]);
        assert!(!fx.frame(&mut handler, 1000));
    }

    #[test]
    fn abort_by_new_push_lands_in_end_state() {
        let mut fx = Fixture::new(true, true);
        let mut handler = Timed::default();
        fx.perform(&mut handler);
        let other = ControllerId::from("other");
        let new_handler = Timed::default();
        let mut cx = ChangeContext::new(&mut fx.tree, &fx.info);
        handler.on_abort_push(&new_handler, Some(&other), &mut cx);
        assert!(cx.is_completed());
        assert_eq!(fx.children(), vec![fx.info.to.unwrap()]);
    }

    #[test]
    fn pop_keeps_entering_view_beneath() {
        let mut fx = Fixture::new(false, true);
        let mut handler = Timed::default().duration(Duration::from_millis(10));
        fx.perform(&mut handler);
        assert_eq!(fx.children(), vec![fx.info.to.unwrap(), fx.info.from.unwrap()]);
        assert!(fx.frame(&mut handler, 10));
        assert_eq!(fx.children(), vec![fx.info.to.unwrap()]);
    }

    #[test]
    fn config_round_trips() {
        let handler = Timed::default()
            .duration(Duration::from_millis(150))
            .removes_from_view(false)
            .easing(Easing::Linear);
        let saved = handler.save_config();
        let restored = Timed::from_config(&saved).unwrap();
        assert_eq!(restored.save_config(), saved);
        assert_eq!(restored.configured_duration(), Some(Duration::from_millis(150)));

        let default_duration = Timed::default();
        let restored = Timed::from_config(&default_duration.save_config()).unwrap();
        assert_eq!(restored.configured_duration(), None);
    }
}
