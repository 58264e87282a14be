//! Demo interop module driven by environment variables.
//!
//! It exports the signatures listed in `FIP_MODULE_SYMBOLS` and answers every
//! compile request with `FIP_MODULE_OBJECT` when that is set.

use anyhow::Context;
use fip::{
    CompileTarget, KillReason, ModuleHandler, ModuleName, ObjectPath, SlaveClient, SlaveConfig,
    SymbolDescriptor,
};
use fip_signature::{FunctionSignature, SignatureError, parse_function_signature};

pub const SYMBOLS_ENV: &str = "FIP_MODULE_SYMBOLS";
pub const OBJECT_ENV: &str = "FIP_MODULE_OBJECT";
pub const NAME_ENV: &str = "FIP_MODULE_NAME";

#[derive(Debug, Clone)]
pub struct DemoModule {
    name: ModuleName,
    exports: Vec<FunctionSignature>,
    object: Option<ObjectPath>,
}

impl DemoModule {
    pub fn new(name: ModuleName) -> Self {
        Self {
            name,
            exports: Vec::new(),
            object: None,
        }
    }

    /// Add exports from `;`-separated signatures. Empty entries are skipped.
    pub fn with_exports(mut self, list: &str) -> Result<Self, SignatureError> {
        for text in list.split(';').filter(|s| !s.trim().is_empty()) {
            self.exports.push(parse_function_signature(text)?);
        }
        Ok(self)
    }

    pub fn with_object(mut self, path: ObjectPath) -> Self {
        self.object = Some(path);
        self
    }

    pub fn exports(&self) -> &[FunctionSignature] {
        &self.exports
    }

    pub fn from_env(index: u32) -> anyhow::Result<Self> {
        let name = std::env::var(NAME_ENV).unwrap_or_else(|_| format!("demo-{index}"));
        let name = ModuleName::new(&name).with_context(|| format!("module name {name:?}"))?;
        let mut module = Self::new(name);

        if let Ok(list) = std::env::var(SYMBOLS_ENV) {
            module = module
                .with_exports(&list)
                .with_context(|| format!("invalid {SYMBOLS_ENV}"))?;
        }
        if let Ok(path) = std::env::var(OBJECT_ENV) {
            let path = ObjectPath::new(&path).with_context(|| format!("invalid {OBJECT_ENV}"))?;
            module = module.with_object(path);
        }
        Ok(module)
    }
}

#[async_trait::async_trait]
impl ModuleHandler for DemoModule {
    fn module_name(&self) -> &ModuleName {
        &self.name
    }

    async fn resolve(&self, symbol: &SymbolDescriptor) -> Option<SymbolDescriptor> {
        let wanted = symbol.as_function()?;
        self.exports
            .iter()
            .find(|export| export.name == wanted.name)
            .cloned()
            .map(SymbolDescriptor::Function)
    }

    async fn compile(&self, target: &CompileTarget) -> Option<ObjectPath> {
        tracing::debug!(%target, "Compile requested");
        self.object
    }
}

/// Connect to the master and serve until told to stop.
pub async fn run_module(index: u32) -> anyhow::Result<KillReason> {
    let module = DemoModule::from_env(index)?;
    tracing::info!(
        module = %module.module_name(),
        exports = module.exports().len(),
        "Starting module"
    );

    let mut client = SlaveClient::connect(SlaveConfig::from_env(index))
        .await
        .context("connecting to master")?;
    Ok(client.run(&module).await?)
}
