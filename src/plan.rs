use crate::models::UpdateRecord;

const CREATE_CMD: [&str; 5] = ["docker", "manifest", "create", "--insecure", "--amend"];
const PUSH_CMD: [&str; 4] = ["docker", "manifest", "push", "--insecure"];

/// Shell lines that rebuild and push every out-of-sync manifest list.
///
/// Each record yields a `create --amend` line naming the top-level image and
/// one image per contributing architecture, followed by a `push` line.
pub fn emit(updates: &[UpdateRecord], domain: &str) -> Vec<String> {
    let mut lines = Vec::with_capacity(updates.len() * 2);
    for update in updates {
        let top_level = format!("{}/{}", domain, update.repo_tag);

        let mut create: Vec<String> = CREATE_CMD.iter().map(|s| s.to_string()).collect();
        create.push(top_level.clone());
        for arch in &update.archs {
            create.push(format!("{}/{}/{}", domain, arch, update.repo_tag));
        }
        lines.push(create.join(" "));

        let mut push: Vec<String> = PUSH_CMD.iter().map(|s| s.to_string()).collect();
        push.push(top_level);
        lines.push(push.join(" "));
    }
    lines
}
