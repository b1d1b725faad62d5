use depsolve_util::errors::DepsolveError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = DepsolveError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_manifest_error_display() {
    let err = DepsolveError::Manifest {
        message: "bad syntax".to_string(),
    };
    assert_eq!(err.to_string(), "Manifest error: bad syntax");
}

#[test]
fn test_repository_error_display() {
    let err = DepsolveError::Repository {
        message: "duplicate component".to_string(),
    };
    assert_eq!(err.to_string(), "Repository error: duplicate component");
}

#[test]
fn test_resolution_error_display() {
    let err = DepsolveError::Resolution {
        message: "conflict".to_string(),
    };
    assert_eq!(err.to_string(), "Dependency resolution failed: conflict");
}

#[test]
fn test_config_error_display() {
    let err = DepsolveError::Config {
        message: "bad value".to_string(),
    };
    assert_eq!(err.to_string(), "Configuration error: bad value");
}

#[test]
fn test_generic_error_display() {
    let err = DepsolveError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}

#[test]
fn test_error_converts_into_miette_report() {
    let result: depsolve_util::errors::DepsolveResult<()> = Err(DepsolveError::Generic {
        message: "boom".to_string(),
    }
    .into());
    let report = result.unwrap_err();
    assert_eq!(report.to_string(), "boom");
}
