//! About the warning and error information when an interrupt occurs at running time.

use thiserror::Error;





/// Errors raised by the neural network potential.
///
/// None of them is recoverable inside the crate: they indicate a malformed batch or configuration,
/// and the training driver decides whether to halt or skip the offending batch.
#[derive(Debug, Error)]
pub enum NnError
{
    /// Inconsistent architecture, or an element without sub-network.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An input required by the current mode has not been supplied.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Non-positive atom count, or non-positive argument of a logarithm.
    #[error("numeric domain error: {0}")]
    NumericDomain(String),

    /// Incompatible tensor dimensions or out-of-range owner index.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("I/O error on '{path}': {source}")]
    Io
    {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot save or load '{path}': {detail}")]
    Persistence
    {
        path: String,
        detail: String,
    },
}





/// Error message for incompatible dimensions of a variable
pub fn error_shape(variable: &str, expected: &str, found: &str) -> NnError
{
    NnError::ShapeMismatch(format!("'{}' should be {}, but it is {}", variable, expected, found))
}

/// Error message for an owner index outside the batch
pub fn error_owner_index(element: &str, index: usize, batch_size: usize) -> NnError
{
    NnError::ShapeMismatch(format!("atom of element '{}' belongs to structure {}, but the batch only has {} structures", element, index, batch_size))
}





/// Error message for an element without sub-network
pub fn error_missing_network(element: &str) -> NnError
{
    NnError::Configuration(format!("the neural network of element '{}' hasn't been established, since it's not in the list of unique atoms", element))
}

/// Error message for hidden layer widths which don't match the number of layers
pub fn error_hidden_size(n_layers: usize, n_hidden: usize) -> NnError
{
    NnError::Configuration(format!("{} layers need {} hidden widths, but {} are given", n_layers, n_layers.saturating_sub(1), n_hidden))
}





/// Error message for an input which should have been supplied
pub fn error_missing_input(variable: &str, reason: &str) -> NnError
{
    NnError::MissingInput(format!("'{}' is required {}", variable, reason))
}

/// Error message for a value outside the domain of an operation
pub fn error_domain(variable: &str, operation: &str, value: f64) -> NnError
{
    NnError::NumericDomain(format!("'{}' has value {} which is out of the domain of {}", variable, value, operation))
}





/// Error message for file reading, creating, opening, and writing.
pub fn error_file(operation: &str, filename: &str, detail: &str) -> NnError
{
    NnError::Persistence
    {
        path: filename.to_string(),
        detail: format!("there is some problem in {} the file: {}", operation, detail),
    }
}

/// Error message for directory creating
pub fn error_dir(dir: &str, source: std::io::Error) -> NnError
{
    NnError::Io
    {
        path: dir.to_string(),
        source,
    }
}
