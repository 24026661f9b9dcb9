//! Built-in message templates, keyed by tag variant.
//!
//! Placeholders are `{field}` names taken from the event data, plus the
//! injected `webview_url` and `webswview_url`.

pub const PACKAGE_BUILD_SUCCESS: &str = r##"Package build for <b>{pkgname} {version}</b> on <em>{architecture}</em> was <font color="#265500">successful</font>."##;

pub const PACKAGE_BUILD_FAILED: &str = r##"Package build for <b>{pkgname} {version}</b> on <em>{architecture}</em> has <font color="#b7241b">failed</font>."##;

pub const SRC_PACKAGE_SYNCED: &str =
    r##"Synchronized package <em>{name}</em> from {src_os} <code>{src_suite}</code> to <code>{dest_suite}</code>, new version is <code>{version}</code>."##;

pub const SRC_PACKAGE_SYNCED_FORCED: &str =
    r##"Enforced synchronization of package <em>{name}</em> from {src_os} <code>{src_suite}</code> to <code>{dest_suite}</code>, new version is <code>{version}</code>."##;

pub const AUTOSYNC_ISSUE: &str = r##"Unable to automatically synchronize {name} from {src_os} <code>{src_suite}</code> to <code>{dest_suite}</code> (source: <code>{src_version}</code>, destination: <code>{dest_version}</code>). Type: {kind}"##;

pub const JOB_ASSIGNED: &str = r##"Assigned {job_kind} job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a> on architecture <code>{job_architecture}</code> to <em>{client_name}</em>"##;

pub const JOB_ACCEPTED: &str = r##"Job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a> was <font color="#265500">accepted</font> by <em>{client_name}</em>"##;

pub const JOB_REJECTED: &str = r##"Job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a> was <font color="#b7241b">rejected</font> by <em>{client_name}</em>"##;

pub const JOB_FINISHED: &str = r##"Job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a> finished with result {result}"##;

pub const UPLOAD_ACCEPTED: &str = r##"Accepted upload for <font color="#265500">successful</font> job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a>."##;

pub const UPLOAD_ACCEPTED_FAILED: &str = r##"Accepted upload for <font color="#b7241b">failed</font> job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a>."##;

pub const UPLOAD_REJECTED: &str = r##"<b>Rejected</b> upload <code>{dud_filename}</code>. Reason: {reason}"##;

pub const RECIPE_CREATED: &str = r##"Created new <em>{kind}</em> image build recipe "{name}" for {os}/{suite} of flavor {flavor} on <code>{architectures}</code>"##;

pub const BUILD_JOB_ADDED: &str = r##"Created image build job <a href="{webview_url}/jobs/job/{job_id}">{job_id}</a> on <code>{architecture}</code> for "{name}" ({os}/{suite} of flavor {flavor})"##;

/// The default template table.
pub const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("_lk.job.package-build-success", PACKAGE_BUILD_SUCCESS),
    ("_lk.job.package-build-failed", PACKAGE_BUILD_FAILED),
    ("_lk.synchrotron.src-package-synced", SRC_PACKAGE_SYNCED),
    ("_lk.synchrotron.src-package-synced:forced", SRC_PACKAGE_SYNCED_FORCED),
    ("_lk.synchrotron.autosync-issue", AUTOSYNC_ISSUE),
    ("_lk.jobs.job-assigned", JOB_ASSIGNED),
    ("_lk.jobs.job-accepted", JOB_ACCEPTED),
    ("_lk.jobs.job-rejected", JOB_REJECTED),
    ("_lk.jobs.job-finished", JOB_FINISHED),
    ("_lk.rubicon.upload-accepted", UPLOAD_ACCEPTED),
    ("_lk.rubicon.upload-accepted:failed", UPLOAD_ACCEPTED_FAILED),
    ("_lk.rubicon.upload-rejected", UPLOAD_REJECTED),
    ("_lk.isotope.recipe-created", RECIPE_CREATED),
    ("_lk.isotope.build-job-added", BUILD_JOB_ADDED),
];
