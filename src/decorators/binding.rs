//! Argument bindings: how a call site turns its input into key arguments.
//!
//! A [`Binding`] is declared once per decoration site as an ordered list of
//! `(name, accessor)` pairs. At call time each accessor reads one value from
//! the input, producing the [`Arguments`] the key is derived from.

use std::fmt;

use serde_json::Value;

use crate::key::Arguments;

type Accessor<I> = Box<dyn Fn(&I) -> Value + Send + Sync>;
type BatchAccessor<I> = Box<dyn Fn(&I) -> Vec<Arguments> + Send + Sync>;

/// Named accessors over an input type.
///
/// ```rust
/// # use rescache::Binding;
/// struct GetUser {
///     id: u64,
///     verbose: bool,
/// }
///
/// let binding = Binding::new()
///     .arg("id", |req: &GetUser| req.id)
///     .arg("verbose", |req: &GetUser| req.verbose);
/// let args = binding.bind(&GetUser { id: 7, verbose: false });
/// assert_eq!(args.get("id"), Some(&serde_json::json!(7)));
/// ```
pub struct Binding<I> {
    accessors: Vec<(String, Accessor<I>)>,
}

impl<I> Binding<I> {
    pub fn new() -> Self {
        Self {
            accessors: Vec::new(),
        }
    }

    /// Bind argument `name` to the value `accessor` reads from the input.
    pub fn arg<F, V>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        I: 'static,
        F: Fn(&I) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.accessors
            .push((name.into(), Box::new(move |input: &I| -> Value { accessor(input).into() })));
        self
    }

    /// Declared argument names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.iter().map(|(name, _)| name.as_str())
    }

    /// Read every declared argument from `input`.
    pub fn bind(&self, input: &I) -> Arguments {
        self.accessors
            .iter()
            .map(|(name, accessor)| (name.as_str(), accessor(input)))
            .collect()
    }
}

impl<I> Default for Binding<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> fmt::Debug for Binding<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("arguments", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Accessor producing one argument set per affected resource.
///
/// Used by batch invalidations, where a single mutation touches a
/// collection of resources:
///
/// ```rust
/// # use rescache::{Arguments, BatchBinding};
/// struct Archive {
///     ids: Vec<u64>,
/// }
///
/// let binding = BatchBinding::new(|req: &Archive| {
///     req.ids.iter().map(|id| Arguments::new().with("id", *id)).collect::<Vec<_>>()
/// });
/// assert_eq!(binding.bind(&Archive { ids: vec![1, 2, 3] }).len(), 3);
/// ```
pub struct BatchBinding<I> {
    accessor: BatchAccessor<I>,
}

impl<I> BatchBinding<I> {
    pub fn new<F, It>(accessor: F) -> Self
    where
        I: 'static,
        F: Fn(&I) -> It + Send + Sync + 'static,
        It: IntoIterator<Item = Arguments>,
    {
        Self {
            accessor: Box::new(move |input: &I| -> Vec<Arguments> {
                accessor(input).into_iter().collect()
            }),
        }
    }

    pub fn bind(&self, input: &I) -> Vec<Arguments> {
        (self.accessor)(input)
    }
}

impl<I: 'static> From<Binding<I>> for BatchBinding<I> {
    fn from(binding: Binding<I>) -> Self {
        BatchBinding::new(move |input: &I| std::iter::once(binding.bind(input)))
    }
}

impl<I> fmt::Debug for BatchBinding<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BatchBinding")
    }
}
