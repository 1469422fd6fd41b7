//! `Date` objects

use std::fmt;
use std::ops::Deref;

use crate::diagnostics::{InstanceKind, InstanceToken};
use crate::intrinsics::Intrinsic;
use crate::object::JscObject;
use crate::value::JscValue;

/// A handle to a JavaScript `Date`
///
/// Built by the engine's own `Date` constructor through
/// [`JscContext::create_date`](crate::JscContext::create_date) and
/// [`JscContext::create_date_with`](crate::JscContext::create_date_with), or
/// obtained with [`JscObject::as_date`].
#[derive(Clone)]
pub struct JscDate {
    object: JscObject,
    _token: InstanceToken,
}

impl JscDate {
    pub(crate) fn from_object(object: JscObject) -> Self {
        Self {
            object,
            _token: InstanceToken::new(InstanceKind::Date),
        }
    }

    /// Milliseconds since the epoch; NaN for an invalid date
    ///
    /// Reads the engine's time value directly; a `getTime` defined by script
    /// is not consulted.
    pub fn time_value(&self) -> f64 {
        self.context()
            .call_intrinsic(Intrinsic::DateTime, self)
            .to_number()
    }

    pub fn is_valid(&self) -> bool {
        !self.time_value().is_nan()
    }

    /// `toISOString()`. `None` for an invalid date (the RangeError goes to
    /// the exception handler).
    pub fn to_iso_string(&self) -> Option<String> {
        let iso = self.context().call_intrinsic(Intrinsic::DateToIsoString, self);
        if !iso.is_string() {
            return None;
        }
        iso.to_js_string()
    }

    pub fn as_object(&self) -> &JscObject {
        &self.object
    }

    pub fn into_object(self) -> JscObject {
        self.object
    }
}

impl Deref for JscDate {
    type Target = JscObject;

    fn deref(&self) -> &JscObject {
        &self.object
    }
}

impl From<JscDate> for JscValue {
    fn from(date: JscDate) -> Self {
        date.object.into_value()
    }
}

impl fmt::Debug for JscDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscDate({})", self.time_value())
    }
}

#[cfg(test)]
mod tests {
    use crate::JscContext;

    #[test]
    fn test_epoch() {
        let ctx = JscContext::create().unwrap();
        let date = ctx.create_date_with(&[ctx.number(0.0)]).unwrap();
        assert_eq!(date.time_value(), 0.0);
        assert_eq!(date.to_iso_string().as_deref(), Some("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_components() {
        let ctx = JscContext::create().unwrap();
        let args = [ctx.string("2024-02-29T12:30:00Z").unwrap()];
        let date = ctx.create_date_with(&args).unwrap();
        assert!(date.is_valid());
        assert_eq!(
            date.invoke("getUTCMonth", &[]).unwrap().to_number(),
            1.0
        );
    }

    #[test]
    fn test_no_arguments_is_now() {
        let ctx = JscContext::create().unwrap();
        let now = ctx.evaluate_script("Date.now()").unwrap().to_number();
        let date = ctx.create_date().unwrap();
        assert!((date.time_value() - now).abs() < 60_000.0);
    }

    #[test]
    fn test_invalid_date() {
        let ctx = JscContext::create().unwrap();
        let date = ctx.create_date_with(&[ctx.string("not a date").unwrap()]).unwrap();
        assert!(date.time_value().is_nan());
        assert!(!date.is_valid());

        assert_eq!(date.to_iso_string(), None);
        assert_eq!(
            ctx.exception().unwrap().exception_details().name,
            "RangeError"
        );
    }

    #[test]
    fn test_script_date_downcast() {
        let ctx = JscContext::create().unwrap();
        let object = ctx.evaluate_script("new Date(86400000)").unwrap().to_object().unwrap();
        let date = object.as_date().unwrap();
        assert_eq!(date.time_value(), 86_400_000.0);
    }

    #[test]
    fn test_overridden_methods_are_ignored() {
        let ctx = JscContext::create().unwrap();
        let date = ctx.create_date_with(&[ctx.number(1_000.0)]).unwrap();
        ctx.global_object().set_property("d", &date).unwrap();
        ctx.evaluate_script(
            "d.getTime = () => { throw new Error('getTime'); };
             Date.prototype.toISOString = () => { throw new Error('toISOString'); };",
        )
        .unwrap();

        let marker = ctx.string("untouched").unwrap();
        ctx.set_exception(Some(&marker)).unwrap();

        assert_eq!(date.time_value(), 1_000.0);
        assert_eq!(date.to_iso_string().as_deref(), Some("1970-01-01T00:00:01.000Z"));
        assert_eq!(format!("{:?}", date), "JscDate(1000)");
        assert_eq!(ctx.exception(), Some(marker));
    }
}
