use crate::errors::ReplayError;
use crate::git::VersionControl;
use crate::logging::append_run_log;
use crate::types::{CommitRecord, CommitRef, ReplayList};
use serde_json::json;

/// Lists the commits in `relative..upto`, oldest first, with their parents.
pub fn resolve_replay_list(
    vcs: &dyn VersionControl,
    relative: &str,
    upto: &str,
) -> Result<ReplayList, ReplayError> {
    for reference in [relative, upto] {
        vcs.resolve_commit(reference)
            .map_err(|e| ReplayError::Resolution(format!("`{reference}`: {e}")))?;
    }

    let log = vcs
        .log_with_parents(relative, upto)
        .map_err(|e| ReplayError::Resolution(format!("`{relative}..{upto}`: {e}")))?;
    let mut records = parse_history(&log)?;
    if records.is_empty() {
        return Err(ReplayError::Resolution(format!(
            "`{relative}..{upto}` contains no commits; nothing to replay"
        )));
    }
    records.reverse();

    append_run_log(
        "info",
        "resolver.range.resolved",
        json!({
            "relative": relative,
            "upto": upto,
            "count": records.len(),
            "merges": records.iter().filter(|r| r.is_merge()).count()
        }),
    );
    Ok(records)
}

/// Parses `<id> <parent>...` lines, keeping the order they were printed in.
pub fn parse_history(log: &str) -> Result<Vec<CommitRecord>, ReplayError> {
    log.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(line: &str) -> Result<CommitRecord, ReplayError> {
    let mut ids = line.split_whitespace().map(|token| {
        if is_object_id(token) {
            Ok(CommitRef::new(token))
        } else {
            Err(ReplayError::Resolution(format!(
                "malformed history entry {line:?}: {token:?} is not a commit id"
            )))
        }
    });
    let id = match ids.next() {
        Some(id) => id?,
        None => {
            return Err(ReplayError::Resolution(format!(
                "malformed history entry {line:?}"
            )))
        }
    };
    let parents = ids.collect::<Result<Vec<_>, _>>()?;
    Ok(CommitRecord { id, parents })
}

fn is_object_id(token: &str) -> bool {
    token.len() >= 4 && token.chars().all(|c| c.is_ascii_hexdigit())
}
