use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

// -----------------------------------------------------------------------------
// Warning

/// A recoverable condition met during a serialization call.
///
/// Warnings never abort a call. They are logged through `log::warn!`
/// and kept in the [`SerializationContext`] for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Warning {
    /// A reference to an object id that the data does not contain.
    /// The field was set to no reference.
    MissingReference { object_id: u32 },
    /// A non-weak reference into an object that is still being decoded
    /// or patched. The field received the partially built instance.
    CircularReference { type_name: &'static str },
    /// Data of another type was found where a value of `expected` lives.
    /// The data was skipped and the value left unchanged.
    TypeMismatch { expected: &'static str, found: u32 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReference { object_id } => write!(
                f,
                "object id {object_id} was referenced but no such object was contained"
            ),
            Self::CircularReference { type_name } => write!(
                f,
                "non-weak circular reference into `{type_name}`, the referencing field \
                 receives an incomplete instance; mark the field weak to silence this"
            ),
            Self::TypeMismatch { expected, found } => write!(
                f,
                "found data of type id {found} where `{expected}` was expected, skipped"
            ),
        }
    }
}

// -----------------------------------------------------------------------------
// SerializationContext

/// Caller-supplied state handed to every lifecycle hook.
///
/// # Examples
///
/// ```
/// use vc_reflect::SerializationContext;
///
/// let mut ctx = SerializationContext::with_flags(0b10);
/// ctx.set_user_data(String::from("level-1"));
///
/// assert_eq!(ctx.flags(), 0b10);
/// assert_eq!(ctx.user_data::<String>().unwrap(), "level-1");
/// assert!(ctx.warnings().is_empty());
/// ```
#[derive(Default)]
pub struct SerializationContext {
    flags: u32,
    user_data: Option<Box<dyn Any + Send>>,
    warnings: Vec<Warning>,
}

impl SerializationContext {
    /// Creates an empty context.
    #[inline]
    pub const fn new() -> Self {
        Self {
            flags: 0,
            user_data: None,
            warnings: Vec::new(),
        }
    }

    /// Creates a context with user flags.
    #[inline]
    pub const fn with_flags(flags: u32) -> Self {
        Self {
            flags,
            user_data: None,
            warnings: Vec::new(),
        }
    }

    /// Returns the user flags.
    #[inline]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Replaces the user flags.
    #[inline]
    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Stores arbitrary user data, replacing the previous one.
    pub fn set_user_data<T: Any + Send>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    /// Returns the user data if it is of type `T`.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_deref()?.downcast_ref()
    }

    /// Returns the user data mutably if it is of type `T`.
    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_deref_mut()?.downcast_mut()
    }

    /// Logs a warning and records it.
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Warnings recorded since creation or the last [`take_warnings`](Self::take_warnings).
    #[inline]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drains the recorded warnings.
    #[inline]
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        core::mem::take(&mut self.warnings)
    }
}

impl fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("flags", &self.flags)
            .field("has_user_data", &self.user_data.is_some())
            .field("warnings", &self.warnings)
            .finish()
    }
}
