// Each test binary compiles this module independently and uses a different
// subset of helpers, so unused-function warnings are expected.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ak_cli::cli::Cli;
use ak_core::services::aws::PushOutcome;
use ak_core::services::deployer::Toolchain;
use ak_core::services::secrets::SecretBundle;
use ak_core::{Result, StackError};
use async_trait::async_trait;
use clap::Parser;

pub const DEMO_YAML: &str = "\
name: demo
agents:
  - name: worker
    containerImage: registry.example/worker:1
";

pub const DEMO_ENV: &str = "\
# credentials
export ANTHROPIC_API_KEY=sk-ant-1234567890
LLM_PROVIDER=anthropic
UNRELATED=value
OPENAI_API_KEY=your-openai-key
";

/// Records every call; optionally fails secret pushes.
#[derive(Default)]
pub struct FakeToolchain {
    pub calls: Mutex<Vec<String>>,
    pub fail_push: bool,
    pub outputs: BTreeMap<String, String>,
}

impl FakeToolchain {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn push_secret(&self, bundle: &SecretBundle, region: &str) -> Result<PushOutcome> {
        self.record(format!("push {} {region}", bundle.name));
        if self.fail_push {
            return Err(StackError::external("push secrets", "AccessDeniedException"));
        }
        Ok(PushOutcome::Created)
    }

    async fn caller_account(&self, _region: &str) -> Result<String> {
        self.record("account".to_string());
        Ok("123456789012".to_string())
    }

    async fn bootstrap(&self, account: &str, region: &str) -> Result<()> {
        self.record(format!("bootstrap {account} {region}"));
        Ok(())
    }

    async fn deploy_stack(
        &self,
        stack_name: &str,
        _template: &Path,
        _parameters: &BTreeMap<String, String>,
        region: &str,
    ) -> Result<()> {
        self.record(format!("deploy {stack_name} {region}"));
        Ok(())
    }

    async fn stack_outputs(&self, stack_name: &str, region: &str) -> Result<BTreeMap<String, String>> {
        self.record(format!("outputs {stack_name} {region}"));
        Ok(self.outputs.clone())
    }
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn parse(args: &[&str]) -> Cli {
    let mut full = vec!["agentkit"];
    full.extend_from_slice(args);
    Cli::try_parse_from(full).unwrap()
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}
