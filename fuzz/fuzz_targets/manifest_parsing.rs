#![no_main]
use libfuzzer_sys::fuzz_target;
use mfe_orchestrator::module::registry::{ActivationPlan, ModuleManifest, ModuleRegistry};
use mfe_orchestrator::module::GateEvaluator;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing and planning must return errors, never panic
    for manifest in [
        ModuleManifest::from_json_str(text),
        ModuleManifest::from_toml_str(text),
    ]
    .into_iter()
    .flatten()
    {
        if let Ok(registry) = ModuleRegistry::from_manifest(manifest) {
            let _ = ActivationPlan::build(&registry, &GateEvaluator::deny_all());
        }
    }
});
