use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers every failure mode of the patching engine: container parsing and
/// serialization, module merging, target lookup, hook injection, the isolation boundary,
/// and plain I/O. Each variant carries the identifying context (module path, type name,
/// method name) needed to diagnose a failed patch run.
///
/// All failures are terminal for the pass that produced them. Retrying a deterministic
/// binary transform with unchanged inputs cannot succeed, so no variant is retried
/// automatically anywhere in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use patchscope::{Error, Module};
/// use std::path::Path;
///
/// match Module::from_file(Path::new("game.psmc")) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::NotSupported) => eprintln!("Not a module container"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed container: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The container is damaged and could not be parsed.
    ///
    /// This error indicates that the byte stream does not conform to the module
    /// container format, or that its integrity digest does not match its content.
    /// The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    ///
    /// This error occurs when trying to read data beyond the end of the input
    /// buffer. It's a safety check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// Indicates that the input is not a module container, or that its structural
    /// version is newer than what this library understands.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories, such as calls
    /// against a destroyed boundary context or an unknown boundary method name.
    #[error("{0}")]
    Error(String),

    /// Two colliding type definitions could not be reconciled during a merge.
    ///
    /// Name collisions between modules are resolved by keeping the first-seen
    /// definition, which is only sound when both definitions are structurally
    /// interchangeable. A mismatch in their member sets is surfaced as this
    /// error instead of being resolved by guessing.
    #[error("Merge conflict on type '{type_name}': {reason}")]
    MergeConflict {
        /// Full name of the colliding type
        type_name: String,
        /// Why the two definitions could not be reconciled
        reason: String,
    },

    /// The requested type does not exist in the module.
    #[error("Type '{type_name}' not found in module")]
    TypeNotFound {
        /// Full name of the type that was looked up
        type_name: String,
    },

    /// The requested method does not exist on the resolved type.
    #[error("Method '{method_name}' not found on type '{type_name}'")]
    MethodNotFound {
        /// Full name of the type that was searched
        type_name: String,
        /// Name of the method that was looked up
        method_name: String,
    },

    /// More than one method matched the requested name.
    ///
    /// Patch targeting must be deterministic across rebuilds of the target module,
    /// so ambiguity is never resolved by picking the first match. The caller has
    /// to narrow the lookup with an explicit parameter type list.
    #[error("Method '{method_name}' on type '{type_name}' is ambiguous: {candidates} overloads match")]
    AmbiguousMethod {
        /// Full name of the type that was searched
        type_name: String,
        /// Name of the method that was looked up
        method_name: String,
        /// How many overloads matched the lookup
        candidates: usize,
    },

    /// A hook reference could not be resolved or applied at injection time.
    #[error("Cannot inject hook '{type_name}.{method_name}': {reason}")]
    InjectionTargetInvalid {
        /// Full name of the hook's declaring type
        type_name: String,
        /// Name of the hook method
        method_name: String,
        /// Why the hook could not be applied
        reason: String,
    },

    /// A patcher type could not be instantiated inside a boundary context.
    ///
    /// Raised when the requested type name is not present in the host registry,
    /// or when the artifact the patcher is bound to cannot be found on disk.
    #[error("Patcher type '{type_name}' could not be loaded")]
    PatcherTypeNotFound {
        /// Registry name of the requested patcher type
        type_name: String,
    },

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex that is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}
