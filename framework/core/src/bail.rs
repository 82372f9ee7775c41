/// Return this error from a scenario action to indicate that the virtual user is bailing.
///
/// This should be used when a VU hits an error that makes further iterations pointless for that
/// VU but not for the run. For example, if the VU's session was revoked then it may bail and the
/// scheduler will start a replacement on its next tick if the target still calls for one.
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
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}
