use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, StackError};

async fn run_cdk(args: &[&str]) -> Result<String> {
    debug!(args = %args.join(" "), "running cdk");
    let output = Command::new("cdk")
        .args(args)
        .output()
        .await
        .map_err(|e| StackError::external("bootstrap", format!("failed to run cdk: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StackError::external(
            "bootstrap",
            format!(
                "cdk {} failed (exit {}): {}",
                args.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn bootstrap_target(account: &str, region: &str) -> String {
    format!("aws://{account}/{region}")
}

/// Prepare the account/region for deployments. Running it on an already
/// bootstrapped environment also reports failure with some tool versions.
pub async fn bootstrap(account: &str, region: &str) -> Result<()> {
    let target = bootstrap_target(account, region);
    run_cdk(&["bootstrap", &target]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_target_format() {
        assert_eq!(
            bootstrap_target("123456789012", "us-west-2"),
            "aws://123456789012/us-west-2"
        );
    }
}
