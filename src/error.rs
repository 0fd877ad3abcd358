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
/// Building an assembly is an offline, deterministic transformation, so there is no retry logic
/// anywhere in the crate: every failure is reported to the caller as soon as it is detected and
/// the builder graph is left as it was before the failing call wherever that is possible.
///
/// # Error Categories
///
/// ## Usage and State Errors
/// - [`Error::InvalidState`] - Operation is not valid in the current builder state
/// - [`Error::AlreadyBaked`] - Attempted to mutate an entity whose owner has been baked
/// - [`Error::NotSupported`] - Requested construct cannot be expressed (e.g. label height conflict)
/// - [`Error::DuplicateLabel`] - A label was marked more than once
/// - [`Error::TypeLoad`] - A type is structurally invalid at bake time
///
/// ## Encoding Errors
/// - [`Error::Malformed`] - Encoded or decoded data violates the binary format
/// - [`Error::InvalidBranch`] - Branch displacement does not fit its encoding
/// - [`Error::StackUnderflow`] - IL stream pops more values than are on the stack
/// - [`Error::InvalidCodedIndex`] - Token cannot be expressed in the requested coded index
/// - [`Error::HeapFull`] - A heap exceeded its addressable size
/// - [`Error::OutOfBounds`] - Read beyond the end of a buffer while decoding
///
/// ## Token Engine Errors
/// - [`Error::UnresolvedToken`] - A pending token had no registered fixup
/// - [`Error::TokenAlreadyRegistered`] - A pending token received a second fixup
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use dotemit::{Error, assembly::ILGenerator};
///
/// let mut il = ILGenerator::new();
/// let label = il.define_label()?;
/// il.mark_label(label)?;
/// match il.mark_label(label) {
///     Err(Error::DuplicateLabel(message)) => println!("{message}"),
///     _ => unreachable!(),
/// }
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Encoded or decoded data does not conform to the ECMA-335 format.
    ///
    /// The error includes the source location where the problem was detected
    /// for debugging purposes.
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

    /// An out of bound access was attempted while decoding a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The requested construct cannot be expressed.
    ///
    /// Raised for unsupported custom attribute argument types, conflicting
    /// stack heights at a label (the backward branch constraint), and other
    /// shapes the binary format has no encoding for.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The operation is not valid in the current builder state.
    ///
    /// Examples are requesting an IL generator for an abstract method,
    /// opening a catch block outside of an exception block, or emitting into
    /// a generator that has already been closed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The entity (or its owner) has already been baked and is immutable.
    #[error("Already baked: {0}")]
    AlreadyBaked(String),

    /// A branch target cannot be encoded.
    ///
    /// Either the label was never marked, or the displacement exceeds the
    /// range of the short (1-byte) branch form.
    #[error("Invalid branch: {0}")]
    InvalidBranch(String),

    /// A label was marked more than once.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    /// The IL stream pops more values than the evaluation stack holds.
    #[error("Stack underflow at IL offset {offset:#06x}")]
    StackUnderflow {
        /// Offset of the instruction that underflowed the stack
        offset: u32,
    },

    /// A pending token was resolved before a real token was registered for it.
    ///
    /// This indicates a defect in the bake pipeline rather than a usage error.
    #[error("Unresolved pending token: {0}")]
    UnresolvedToken(String),

    /// A pending token received more than one fixup.
    #[error("Pending token registered twice: {0}")]
    TokenAlreadyRegistered(String),

    /// A heap exceeded the size its indices can address.
    #[error("Heap is full: {0}")]
    HeapFull(&'static str),

    /// A token cannot be expressed in the requested coded index kind.
    #[error("Token cannot be encoded as the requested coded index")]
    InvalidCodedIndex,

    /// A type is structurally invalid and cannot be baked.
    #[error("Type load failure: {0}")]
    TypeLoad(String),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that occur while reading files that are
    /// hashed into the `File` table.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
