//! Session payload and render bookkeeping types.

use std::sync::Arc;

/// The value held by a session's payload stream: combined state, own props,
/// and the external-stream change counter.
///
/// State and props are `Arc`-wrapped so render memoization can compare them
/// by pointer identity, never by deep equality.
#[derive(Debug)]
pub struct SessionPayload<S, P> {
    pub state: Option<Arc<S>>,
    pub props: Option<Arc<P>>,
    pub external_change_count: u64,
}

impl<S, P> Clone for SessionPayload<S, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            props: self.props.clone(),
            external_change_count: self.external_change_count,
        }
    }
}

impl<S, P> Default for SessionPayload<S, P> {
    fn default() -> Self {
        Self {
            state: None,
            props: None,
            external_change_count: 0,
        }
    }
}

impl<S, P> SessionPayload<S, P> {
    /// Replace the state.
    pub fn with_state(mut self, state: Arc<S>) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the props.
    pub fn with_props(mut self, props: Arc<P>) -> Self {
        self.props = Some(props);
        self
    }

    /// Bump the external change counter.
    pub fn with_external_bump(mut self) -> Self {
        self.external_change_count += 1;
        self
    }
}

// ---------------------------------------------------------------------------
// RenderInput
// ---------------------------------------------------------------------------

fn arc_opt_ptr_eq<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// The snapshot a render pass works from. Memoization compares two inputs by
/// state/props pointer identity and counter equality — the conservative
/// policy: a fresh `Arc` always recomputes.
#[derive(Debug)]
pub(crate) struct RenderInput<S, P> {
    pub state: Option<Arc<S>>,
    pub props: Option<Arc<P>>,
    pub external_change_count: u64,
}

impl<S, P> Clone for RenderInput<S, P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            props: self.props.clone(),
            external_change_count: self.external_change_count,
        }
    }
}

impl<S, P> RenderInput<S, P> {
    pub fn of(payload: &SessionPayload<S, P>) -> Self {
        Self {
            state: payload.state.clone(),
            props: payload.props.clone(),
            external_change_count: payload.external_change_count,
        }
    }

    pub fn matches(&self, other: &Self) -> bool {
        arc_opt_ptr_eq(&self.state, &other.state)
            && arc_opt_ptr_eq(&self.props, &other.props)
            && self.external_change_count == other.external_change_count
    }
}

// ---------------------------------------------------------------------------
// RenderGeneration
// ---------------------------------------------------------------------------

/// How many renders a session has committed. Monotonic:
/// `None → Once → Many`, never decreasing while the session lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderGeneration {
    #[default]
    None,
    Once,
    Many,
}

impl RenderGeneration {
    /// Advance one step; `Many` is terminal.
    pub fn advance(&mut self) {
        *self = match self {
            Self::None => Self::Once,
            Self::Once | Self::Many => Self::Many,
        };
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    pub fn is_once(self) -> bool {
        self == Self::Once
    }
}
