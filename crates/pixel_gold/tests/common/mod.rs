//! Scripted stand-in for `goldctl`.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::{Result, bail};
use pixel_gold::{CommandOutput, CommandRunner, GoldConfig, GpuDevice, GpuInfo, PlatformInfo, SystemInfo};
use std::cell::RefCell;
use std::fs::write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::time::sleep;

/// How each `goldctl` subcommand should behave.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub auth_exit: i32,
    pub init_exit: i32,
    pub compare_exit: i32,
    pub diff_exit: i32,
    /// Written to the failure file when a comparison fails.
    pub triage_link: Option<String>,
    /// Whether `diff` writes input/closest/diff images.
    pub write_diff_images: bool,
    /// Every call fails as if the binary were missing.
    pub spawn_error: bool,
    pub compare_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct ScriptedRunner {
    script: Rc<Script>,
    calls: Rc<RefCell<Vec<Vec<String>>>>,
}

impl ScriptedRunner {
    pub fn new(script: Script) -> Self {
        Self {
            script: Rc::new(script),
            calls: Rc::default(),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Calls rendered as `auth`, `imgtest init`, `imgtest add` or `diff`.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| {
                if call[0] == "imgtest" {
                    format!("imgtest {}", call[1])
                } else {
                    call[0].clone()
                }
            })
            .collect()
    }

    /// The last `imgtest add` invocation.
    pub fn last_compare(&self) -> Option<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .rev()
            .find(|call| call[0] == "imgtest" && call[1] == "add")
            .cloned()
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<PathBuf> {
    let index = args.iter().position(|arg| arg == flag)?;
    args.get(index + 1).map(PathBuf::from)
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, _program: &Path, args: &[String]) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(args.to_vec());
        let script = &self.script;
        if script.spawn_error {
            bail!("No such file or directory (os error 2)");
        }
        let subcommand: Vec<&str> = args.iter().take(2).map(String::as_str).collect();
        match subcommand.as_slice() {
            ["auth", ..] => Ok(CommandOutput::new(script.auth_exit, "auth output")),
            ["imgtest", "init"] => Ok(CommandOutput::new(script.init_exit, "init output")),
            ["imgtest", "add"] => {
                if let Some(delay) = script.compare_delay {
                    sleep(delay).await;
                }
                if script.compare_exit != 0 {
                    if let (Some(link), Some(work_dir)) =
                        (&script.triage_link, flag_value(args, "--work-dir"))
                    {
                        write(work_dir.join("triage_link.txt"), link)?;
                    }
                }
                Ok(CommandOutput::new(script.compare_exit, "Untriaged or negative image"))
            }
            ["diff", ..] => {
                if script.write_diff_images {
                    if let Some(out_dir) = flag_value(args, "--out-dir") {
                        for name in ["input-1234.png", "closest-5678.png", "diff.png"] {
                            write(out_dir.join(name), b"png")?;
                        }
                    }
                }
                Ok(CommandOutput::new(script.diff_exit, "diff output"))
            }
            _ => bail!("unexpected goldctl call: {args:?}"),
        }
    }
}

pub fn bot_config() -> GoldConfig {
    GoldConfig {
        local_pixel_tests: Some(false),
        git_revision: Some("0123abcd".to_owned()),
        ..GoldConfig::default()
    }
}

pub fn local_config() -> GoldConfig {
    GoldConfig {
        local_pixel_tests: Some(true),
        git_revision: Some("0123abcd".to_owned()),
        ..GoldConfig::default()
    }
}

pub fn system_info(vendor_id: u32, device_id: u32) -> SystemInfo {
    SystemInfo {
        gpu: Some(GpuInfo {
            devices: vec![GpuDevice {
                vendor_id,
                device_id,
                driver_vendor: "ANGLE (Intel)".to_owned(),
                driver_version: "2.1.0.b50541b2d6c4".to_owned(),
                ..GpuDevice::default()
            }],
            driver_bug_workarounds: Vec::new(),
        }),
        model_name: String::new(),
    }
}

pub fn platform() -> PlatformInfo {
    PlatformInfo {
        os_name: "linux".to_owned(),
        os_version_name: "focal".to_owned(),
        os_version_detail: String::new(),
    }
}
