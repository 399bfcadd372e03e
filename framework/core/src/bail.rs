/// Return this error from a VU's behaviour function to indicate that the VU is bailing.
///
/// This should be used when a VU hits a problem it cannot recover from, but which should not stop
/// the scenario. For example, if the VU could not obtain a session then it may bail and leave the
/// remaining VUs to carry on. The iteration that returned this error is recorded as failed and the
/// VU is retired.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VuBailError {
    msg: String,
}

impl VuBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VuBailError {
    fn default() -> Self {
        Self::new("VU is bailing")
    }
}
