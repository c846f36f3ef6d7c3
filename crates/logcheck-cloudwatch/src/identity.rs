use aws_config::SdkConfig;

use crate::error::{CloudWatchError, Result};

/// Who the loaded credentials belong to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub user_id: String,
    pub arn: String,
}

/// Resolve the caller identity through STS
///
/// Doubles as an early credentials check: a failure here means no
/// CloudWatch call would succeed either.
pub async fn caller_identity(sdk_config: &SdkConfig) -> Result<CallerIdentity> {
    let client = aws_sdk_sts::Client::new(sdk_config);
    let output = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| CloudWatchError::provider("GetCallerIdentity", e))?;

    Ok(CallerIdentity {
        account: output.account().unwrap_or_default().to_string(),
        user_id: output.user_id().unwrap_or_default().to_string(),
        arn: output.arn().unwrap_or_default().to_string(),
    })
}
