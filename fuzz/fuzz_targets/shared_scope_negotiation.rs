#![no_main]
use libfuzzer_sys::fuzz_target;
use mfe_orchestrator::module::loader::SharedScopeNegotiator;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Negotiation is advisory: any global shape yields a scope
    let scope = SharedScopeNegotiator::new().negotiate(Some(&value));
    let _ = scope.len();
});
