//! Permission Core: checks every incoming Request against the
//! session's capabilities, scope, and any active approved plan via a
//! five-step algorithm.

pub mod canonicalize;

use std::path::{Path, PathBuf};

use op15_domain::error::{DenyReason, Error, Result};
use op15_domain::permissions::{Capability, Mode, SessionPermissions};
use op15_protocol::operation::Operation;
use op15_protocol::request::Request;

use canonicalize::canonicalize_for_containment;

/// One path argument of a request paired with the capability it exercises.
struct PathArg<'a> {
    path: &'a str,
    required_cap: Capability,
}

/// The capability (or capabilities, for `fs.move`) and path arguments an
/// operation exercises, per the algorithm's step 2 `required_cap` table.
fn path_args<'a>(op: &Operation, req: &'a Request) -> Vec<PathArg<'a>> {
    match op {
        Operation::FsList | Operation::FsRead => req
            .get_str("path")
            .map(|p| vec![PathArg { path: p, required_cap: Capability::Read }])
            .unwrap_or_default(),
        Operation::FsWrite => req
            .get_str("path")
            .map(|p| vec![PathArg { path: p, required_cap: Capability::Write }])
            .unwrap_or_default(),
        Operation::FsDelete => req
            .get_str("path")
            .map(|p| vec![PathArg { path: p, required_cap: Capability::Delete }])
            .unwrap_or_default(),
        Operation::FsMove => {
            let mut args = Vec::new();
            if let Some(p) = req.get_str("source") {
                args.push(PathArg { path: p, required_cap: Capability::Read });
            }
            if let Some(p) = req.get_str("destination") {
                args.push(PathArg { path: p, required_cap: Capability::Write });
            }
            args
        }
        Operation::ExecRun => req
            .get_str("cwd")
            .map(|p| vec![PathArg { path: p, required_cap: Capability::Exec }])
            .unwrap_or_else(|| vec![]),
        Operation::Unknown(_) => Vec::new(),
    }
}

/// Check `request` against `permissions`, given `base` (cwd or home, used
/// to resolve relative path arguments for canonicalization). Mutates
/// `permissions` on success when a plan step is consumed (advances the
/// cursor). Returns `Ok(())` to allow, or the appropriate `Error` variant
/// to deny.
pub fn check(request: &Request, permissions: &mut SessionPermissions, base: &Path) -> Result<()> {
    // Step 1: an active plan takes over entirely — it either matches and
    // advances, or denies; either way we return immediately.
    if permissions.approved_plan.is_some() {
        let step = permissions
            .next_plan_step()
            .ok_or(Error::PlanViolation)?
            .clone();
        if step.operation != request.operation.as_str() || !step.args_subset_of(&request.args) {
            return Err(Error::PlanViolation);
        }
        permissions.advance_plan();
        return Ok(());
    }

    // exec.run with no explicit cwd still requires the `exec` capability
    // even though it has no path argument to scope-check.
    if matches!(request.operation, Operation::ExecRun) && request.get_str("cwd").is_none() {
        if !permissions.allowed_operations.contains(&Capability::Exec) {
            return Err(Error::PermissionDenied { reason: DenyReason::Capability });
        }
        return Ok(());
    }

    if matches!(request.operation, Operation::Unknown(_)) {
        return Err(Error::UnknownOperation(request.operation.as_str().to_string()));
    }

    let args = path_args(&request.operation, request);

    // Step 3: capability check, one per path argument's required_cap.
    for arg in &args {
        if !permissions.allowed_operations.contains(&arg.required_cap) {
            return Err(Error::PermissionDenied { reason: DenyReason::Capability });
        }
    }

    // Step 4: per-path mode/scope check.
    for arg in &args {
        check_scope(permissions, base, arg)?;
    }

    Ok(())
}

fn check_scope(permissions: &SessionPermissions, base: &Path, arg: &PathArg<'_>) -> Result<()> {
    match permissions.mode {
        Mode::Unrestricted => Ok(()),
        Mode::Safe => {
            if arg.required_cap == Capability::Read {
                Ok(())
            } else {
                Err(Error::PermissionDenied { reason: DenyReason::Capability })
            }
        }
        Mode::Balanced => {
            let canon = canonicalize_for_containment(Path::new(arg.path), base);
            let allowed = permissions
                .allowed_directories
                .iter()
                .any(|prefix| canon.starts_with(canonicalize_prefix(prefix)));
            if allowed {
                Ok(())
            } else {
                Err(Error::PermissionDenied { reason: DenyReason::Scope })
            }
        }
    }
}

fn canonicalize_prefix(prefix: &PathBuf) -> PathBuf {
    prefix.canonicalize().unwrap_or_else(|_| prefix.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use op15_domain::permissions::PlanStep;
    use tempfile::TempDir;

    fn req(op: Operation, args: &[(&str, serde_json::Value)]) -> Request {
        Request::new(
            "r1",
            op,
            args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    // Read-only default session.
    #[test]
    fn default_session_allows_read_denies_write() {
        let tmp = TempDir::new().unwrap();
        let mut perms = SessionPermissions::default();
        let list_req = req(Operation::FsList, &[("path", "/tmp".into())]);
        assert!(check(&list_req, &mut perms, tmp.path()).is_ok());

        let write_req = req(
            Operation::FsWrite,
            &[("path", "/tmp/x".into()), ("content", "y".into())],
        );
        let err = check(&write_req, &mut perms, tmp.path()).unwrap_err();
        assert_eq!(
            err,
            Error::PermissionDenied { reason: DenyReason::Capability }
        );
    }

    // Plan enforcement.
    #[test]
    fn plan_enforces_order_and_args() {
        let mut perms = SessionPermissions {
            approved_plan: Some(vec![
                PlanStep {
                    id: "a".into(),
                    operation: "exec.run".into(),
                    args: BTreeMap::from([("command".to_string(), "git status".into())]),
                },
                PlanStep {
                    id: "b".into(),
                    operation: "fs.read".into(),
                    args: BTreeMap::from([("path".to_string(), "/home/u/README.md".into())]),
                },
            ]),
            ..Default::default()
        };
        let base = Path::new("/home/u");

        let step1 = req(Operation::ExecRun, &[("command", "git status".into())]);
        assert!(check(&step1, &mut perms, base).is_ok());
        assert_eq!(perms.approved_step_cursor, 1);

        let wrong = req(Operation::FsRead, &[("path", "/home/u/OTHER.md".into())]);
        assert_eq!(check(&wrong, &mut perms, base).unwrap_err(), Error::PlanViolation);
        assert_eq!(perms.approved_step_cursor, 1); // unchanged

        let step2 = req(Operation::FsRead, &[("path", "/home/u/README.md".into())]);
        assert!(check(&step2, &mut perms, base).is_ok());
        assert!(perms.approved_plan.is_some()); // exhausted, but still active
        assert!(perms.next_plan_step().is_none());

        // Plan is exhausted but still active, so any further operation
        // (even one safe mode would otherwise allow) is a plan-violation
        // until a new plan-approve or supersede clears it.
        let step3 = req(Operation::FsList, &[("path", "/".into())]);
        assert_eq!(check(&step3, &mut perms, base).unwrap_err(), Error::PlanViolation);
    }

    // Balanced scope.
    #[test]
    fn balanced_scope_enforces_prefix_containment() {
        let tmp = TempDir::new().unwrap();
        let projects = tmp.path().join("projects");
        std::fs::create_dir_all(&projects).unwrap();
        let mut perms = SessionPermissions {
            mode: Mode::Balanced,
            allowed_operations: BTreeSet::from([Capability::Read, Capability::Write]),
            allowed_directories: vec![projects.clone()],
            ..Default::default()
        };

        let inside = req(
            Operation::FsWrite,
            &[
                ("path", projects.join("a/b.txt").display().to_string().into()),
                ("content", "hi".into()),
            ],
        );
        assert!(check(&inside, &mut perms, tmp.path()).is_ok());

        let outside = req(
            Operation::FsWrite,
            &[
                ("path", tmp.path().join("notes.txt").display().to_string().into()),
                ("content", "hi".into()),
            ],
        );
        assert_eq!(
            check(&outside, &mut perms, tmp.path()).unwrap_err(),
            Error::PermissionDenied { reason: DenyReason::Scope }
        );

        let escape = req(
            Operation::FsWrite,
            &[
                ("path", projects.join("../secret.txt").display().to_string().into()),
                ("content", "hi".into()),
            ],
        );
        assert_eq!(
            check(&escape, &mut perms, tmp.path()).unwrap_err(),
            Error::PermissionDenied { reason: DenyReason::Scope }
        );
    }

    #[test]
    fn unrestricted_mode_allows_any_path() {
        let tmp = TempDir::new().unwrap();
        let mut perms = SessionPermissions {
            mode: Mode::Unrestricted,
            allowed_operations: BTreeSet::from([Capability::Read, Capability::Write, Capability::Delete, Capability::Exec]),
            ..Default::default()
        };
        let write_req = req(
            Operation::FsWrite,
            &[("path", "/anywhere/x.txt".into()), ("content", "y".into())],
        );
        assert!(check(&write_req, &mut perms, tmp.path()).is_ok());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut perms = SessionPermissions {
            mode: Mode::Unrestricted,
            allowed_operations: BTreeSet::from([Capability::Read]),
            ..Default::default()
        };
        let copy_req = req(Operation::Unknown("fs.copy".into()), &[]);
        let err = check(&copy_req, &mut perms, tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "unknown-operation");
    }
}
