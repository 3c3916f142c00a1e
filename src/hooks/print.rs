//! Log every sample passing through the path

use crate::core::SampleRef;
use crate::hot_path::hook::{parse_settings, Hook, HookContext, HookError, HookPlugin};
use serde::Deserialize;
use std::fmt::Write;

pub const PLUGIN: HookPlugin = HookPlugin {
    name: "print",
    description: "Print the message to the log",
    priority: 99,
    builtin: false,
    create,
};

fn create() -> Box<dyn Hook> {
    Box::<PrintHook>::default()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrintSettings {
    /// Prepended to every line
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Default)]
pub struct PrintHook {
    settings: PrintSettings,
    line: String,
}

impl PrintHook {
    /// Render one sample: `sequence (origin) v0 v1 ...`
    pub fn format(&mut self, smp: &SampleRef) -> &str {
        self.line.clear();
        if let Some(prefix) = &self.settings.prefix {
            self.line.push_str(prefix);
            self.line.push(' ');
        }
        let _ = write!(self.line, "{} ({:.9})", smp.sequence, smp.ts.origin.as_secs_f64());
        for value in smp.values() {
            let _ = write!(self.line, " {}", value);
        }
        &self.line
    }

    fn print(&mut self, smps: &[SampleRef], dir: &'static str, ctx: &HookContext<'_>) {
        for smp in smps {
            let line = self.format(smp);
            tracing::info!(target: "hook", path = ctx.path(), dir, "{}", line);
        }
    }
}

impl Hook for PrintHook {
    fn name(&self) -> &'static str {
        PLUGIN.name
    }

    fn parse(&mut self, cfg: &toml::Table) -> Result<(), HookError> {
        self.settings = parse_settings(PLUGIN.name, cfg)?;
        Ok(())
    }

    fn read(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        self.print(&smps[..*cnt], "in", ctx);
        Ok(())
    }

    fn write(&mut self, smps: &mut [SampleRef], cnt: &mut usize, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        self.print(&smps[..*cnt], "out", ctx);
        Ok(())
    }
}
