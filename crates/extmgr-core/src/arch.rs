//! Host architecture naming.

/// Sentinel architecture accepted on any host.
pub const ANY_ARCHITECTURE: &str = "_any";

/// Architecture of the running host, in the vocabulary image metadata
/// uses (`x86-64`, not `x86_64`).
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86-64",
        "x86" => "x86",
        "aarch64" => "aarch64",
        "arm" => "arm",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        "powerpc64" => "ppc64",
        "loongarch64" => "loongarch64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_architecture_is_stable_and_nonempty() {
        let arch = host_architecture();
        assert!(!arch.is_empty());
        assert_eq!(arch, host_architecture());
        // The underscore spelling never leaks out.
        assert!(!arch.contains('_'));
    }
}
