//! Prompt text for diagnostic runs.

use serde_json::json;

use super::types::FailureReport;

/// System prompt sent as the first message of every run.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to a set of tools. \
When you use a tool, report what it returned in a clear and friendly tone.";

/// Log lines requested from the pod in the suggested first call.
const TAIL_LINES: u32 = 10;

/// Build the task prompt for one failure report.
///
/// The prompt shows the model two worked examples of the expected answer
/// (a short diagnosis followed by an inline `create_issue` call) and then
/// the steps for the pod at hand.
pub fn diagnostic_prompt(report: &FailureReport, owner: &str, repo: &str) -> String {
    let location = match report.container() {
        Some(container) => format!(
            "container '{container}' of pod '{}' in namespace '{}'",
            report.pod_name, report.namespace
        ),
        None => format!("pod '{}' in namespace '{}'", report.pod_name, report.namespace),
    };

    let mut log_args = json!({
        "namespace": report.namespace,
        "name": report.pod_name,
        "tailLines": TAIL_LINES,
    });
    if let Some(container) = report.container() {
        log_args["container"] = json!(container);
    }
    let log_call = json!({"name": "pods_log", "arguments": log_args});

    let issue_call = issue_example(owner, repo, "Issue with Agent pipeline", "<summary of the error>");

    let example_pull = issue_example(
        owner,
        repo,
        "Issue with pipeline",
        "### Cluster/namespace location\nwebapp/frontend-v2-abcde\n\n\
         ### Summary of the problem\nThe pod cannot start because its image cannot be pulled.\n\n\
         ### Detailed error/code\nImagePullBackOff: Back-off pulling image 'my-registry/frontend:latest'\n\n\
         ### Possible solutions\n1. Check that the 'latest' tag exists in 'my-registry/frontend'.\n\
         2. Check the pull secret for the registry.",
    );

    let example_oom = issue_example(
        owner,
        repo,
        "Issue with pipeline",
        "### Cluster/namespace location\npipelines/data-processor-xyz\n\n\
         ### Summary of the problem\nThe container exceeds its memory limit and is restarted repeatedly.\n\n\
         ### Detailed error/code\nCrashLoopBackOff, last state: OOMKilled\n\n\
         ### Possible solutions\n1. Raise the memory limit in the deployment.\n\
         2. Profile the application for memory leaks.",
    );

    format!(
        "You are an experienced OpenShift administrator. Read the pod logs, summarize the \
failure, and produce a JSON tool call that files a tracking issue. Answer in the same \
shape as the examples.

---
EXAMPLE 1:
Input: Logs for pod 'frontend-v2-abcde' in namespace 'webapp' show: ImagePullBackOff: \
Back-off pulling image 'my-registry/frontend:latest'.

Output:
The pod is in **ImagePullBackOff**: the image 'my-registry/frontend:latest' cannot be \
pulled, most likely a wrong tag or missing registry credentials.
{example_pull}

---
EXAMPLE 2:
Input: Logs for pod 'data-processor-xyz' in namespace 'pipelines' show: CrashLoopBackOff. \
Last state: OOMKilled.

Output:
The pod is in **CrashLoopBackOff** after being **OOMKilled**: the container used more \
memory than its limit allows.
{example_oom}
---

YOUR TASK:

Steps:
1. Fetch the logs with: {log_call}
2. Find the error in the logs.
3. File an issue summarizing it with: {issue_call}

Begin by fetching the logs for {location}.
"
    )
}

fn issue_example(owner: &str, repo: &str, title: &str, body: &str) -> String {
    json!({
        "name": "create_issue",
        "arguments": {"owner": owner, "repo": repo, "title": title, "body": body},
    })
    .to_string()
}
