//! Example manifest YAML, grounded on the literal fixtures in spec section
//! 8's end-to-end scenarios. Each constant is valid input to the
//! corresponding descriptor's `from_contents`.

/// A minimal single-component SDK manifest for edition `open-source`,
/// version `0.0.1-whatever`, naming one component `meep`.
pub const SDK_MANIFEST_ONE_COMPONENT: &str = r#"
apiVersion: digitalasset.com/v1
kind: SdkManifest
spec:
  edition: open-source
  version: 0.0.1-whatever
  components:
    meep:
      image-tag: 1.2.3
"#;

/// A component manifest declaring one native command, one export, and no
/// dependency-paths.
pub const COMPONENT_MANIFEST_MEEP: &str = r#"
apiVersion: digitalasset.com/v1
kind: Component
spec:
  commands:
    - name: meep
      path: bin/meep
  exports:
    MEEP_EXTERNAL_DAR:
      paths:
        - share/meep.dar
      conflict-strategy: extend
"#;

/// A package descriptor with an explicit `sdk-version` and no overrides.
pub const PACKAGE_DESCRIPTOR_PINNED: &str = r#"
sdk-version: 0.0.1-whatever
"#;

/// A package descriptor with an explicitly null `sdk-version` (spec 8,
/// "Boundary behaviors").
pub const PACKAGE_DESCRIPTOR_NULL_VERSION: &str = r#"
sdk-version: null
"#;

/// A multi-package descriptor referencing two sibling packages.
pub const MULTI_PACKAGE_TWO_PACKAGES: &str = r#"
packages:
  - ./a
  - ./b
"#;
