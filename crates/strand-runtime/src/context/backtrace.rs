//! Creation-site backtraces stitched across coroutine boundaries.
//!
//! A spawned task starts on a fresh stack, so a panic or error inside
//! it shows nothing of the code that spawned it. Each context keeps the
//! backtrace captured where it was created, linked to its parent's, and
//! [`FullBacktrace`] walks that chain back to the root.

use serde::Serialize;
use std::backtrace::Backtrace;
use std::sync::Arc;
use strand_types::CoroutineId;

/// One link of the creation-site chain.
#[derive(Debug)]
pub struct TraceSegment {
    coroutine: CoroutineId,
    trace: Option<String>,
    parent: Option<Arc<TraceSegment>>,
}

impl TraceSegment {
    /// Records where `coroutine` was created.
    ///
    /// The stack is only captured when `capture` is true; otherwise the
    /// segment keeps the chain shape without trace text.
    #[must_use]
    pub fn new(coroutine: CoroutineId, parent: Option<Arc<Self>>, capture: bool) -> Arc<Self> {
        let trace = capture.then(|| Backtrace::force_capture().to_string());
        Arc::new(Self {
            coroutine,
            trace,
            parent,
        })
    }

    /// Coroutine this segment belongs to.
    #[must_use]
    pub fn coroutine(&self) -> CoroutineId {
        self.coroutine
    }

    /// Captured trace text, if capture was enabled.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Walks from this segment to the root.
    pub fn chain(&self) -> impl Iterator<Item = &TraceSegment> {
        std::iter::successors(Some(self), |s| s.parent.as_deref())
    }
}

/// Logical backtrace of a coroutine and all of its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullBacktrace {
    frames: Vec<BacktraceFrame>,
}

/// Creation-site trace of one coroutine in a [`FullBacktrace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacktraceFrame {
    /// Coroutine the trace belongs to.
    pub coroutine: CoroutineId,
    /// Trace captured where it was created, if enabled.
    pub trace: Option<String>,
}

impl FullBacktrace {
    /// Builds the backtrace from the innermost segment.
    #[must_use]
    pub fn from_segment(segment: &Arc<TraceSegment>) -> Self {
        Self {
            frames: segment
                .chain()
                .map(|s| BacktraceFrame {
                    coroutine: s.coroutine,
                    trace: s.trace.clone(),
                })
                .collect(),
        }
    }

    /// Frames ordered innermost first, root last.
    #[must_use]
    pub fn frames(&self) -> &[BacktraceFrame] {
        &self.frames
    }

    /// Coroutine ids along the chain, root last.
    #[must_use]
    pub fn coroutines(&self) -> Vec<CoroutineId> {
        self.frames.iter().map(|f| f.coroutine).collect()
    }

    /// Returns `true` if at least one frame carries trace text.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        self.frames.iter().any(|f| f.trace.is_some())
    }
}

impl std::fmt::Display for FullBacktrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (depth, frame) in self.frames.iter().enumerate() {
            writeln!(f, "#{depth} coroutine {}", frame.coroutine)?;
            match &frame.trace {
                Some(trace) => writeln!(f, "{trace}")?,
                None => writeln!(f, "  <backtrace not captured>")?,
            }
        }
        Ok(())
    }
}
