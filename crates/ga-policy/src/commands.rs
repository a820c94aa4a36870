// commands.rs — What well-known commands do.
//
// Maps command names to the operation classes they can perform. The table is
// deliberately static: classification must not depend on what happens to be
// installed on the machine.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::profile::OperationClass::{self, *};

/// Static command → operation table.
const COMMAND_TABLE: &[(&str, &[OperationClass])] = &[
    // Read-only utilities and shell builtins.
    ("ls", &[Read]),
    ("cat", &[Read]),
    ("less", &[Read]),
    ("more", &[Read]),
    ("head", &[Read]),
    ("tail", &[Read]),
    ("grep", &[Read]),
    ("egrep", &[Read]),
    ("fgrep", &[Read]),
    ("rg", &[Read]),
    ("find", &[Read]),
    ("du", &[Read]),
    ("df", &[Read]),
    ("free", &[Read]),
    ("ps", &[Read]),
    ("top", &[Read]),
    ("htop", &[Read]),
    ("who", &[Read]),
    ("w", &[Read]),
    ("uptime", &[Read]),
    ("echo", &[Read]),
    ("printf", &[Read]),
    ("pwd", &[Read]),
    ("cd", &[Read]),
    ("wc", &[Read]),
    ("stat", &[Read]),
    ("file", &[Read]),
    ("diff", &[Read]),
    ("cmp", &[Read]),
    ("sort", &[Read]),
    ("uniq", &[Read]),
    ("cut", &[Read]),
    ("awk", &[Read]),
    ("sed", &[Read]),
    ("tree", &[Read]),
    ("which", &[Read]),
    ("whoami", &[Read]),
    ("id", &[Read]),
    ("date", &[Read]),
    ("env", &[Read]),
    ("printenv", &[Read]),
    ("hostname", &[Read]),
    ("uname", &[Read]),
    ("test", &[Read]),
    ("[", &[Read]),
    ("[[", &[Read]),
    ("true", &[Read]),
    ("false", &[Read]),
    ("realpath", &[Read]),
    ("readlink", &[Read]),
    ("basename", &[Read]),
    ("dirname", &[Read]),
    ("md5sum", &[Read]),
    ("sha1sum", &[Read]),
    ("sha256sum", &[Read]),
    ("jq", &[Read]),
    ("tac", &[Read]),
    ("nl", &[Read]),
    ("strings", &[Read]),
    ("xxd", &[Read]),
    ("hexdump", &[Read]),
    ("od", &[Read]),
    ("lsof", &[Read]),
    ("sleep", &[Read]),
    // Writers.
    ("tee", &[Write]),
    ("touch", &[Write]),
    ("mv", &[Write]),
    ("cp", &[Write]),
    ("rsync", &[Write]),
    ("tar", &[Write]),
    ("zip", &[Write]),
    ("unzip", &[Write]),
    ("gzip", &[Write]),
    ("gunzip", &[Write]),
    ("mkdir", &[Write]),
    ("ln", &[Write]),
    ("chmod", &[Write]),
    ("chown", &[Write]),
    ("chgrp", &[Write]),
    ("install", &[Write]),
    ("truncate", &[Write]),
    ("patch", &[Write]),
    // Deleters.
    ("rm", &[Delete]),
    ("rmdir", &[Delete]),
    ("unlink", &[Delete]),
    ("shred", &[Delete]),
    // Privilege escalation.
    ("sudo", &[Privileged]),
    ("doas", &[Privileged]),
    ("su", &[Privileged]),
    ("pkexec", &[Privileged]),
    // Network clients.
    ("curl", &[Network]),
    ("wget", &[Network]),
    ("scp", &[Network]),
    ("sftp", &[Network]),
    ("ssh", &[Network]),
    ("nc", &[Network]),
    ("netcat", &[Network]),
    ("telnet", &[Network]),
    ("ftp", &[Network]),
    ("dig", &[Network]),
    ("nslookup", &[Network]),
    ("ping", &[Network, Read]),
    // Process and service control.
    ("kill", &[Process]),
    ("pkill", &[Process]),
    ("killall", &[Process]),
    ("systemctl", &[Process]),
    ("service", &[Process]),
    ("launchctl", &[Process]),
    ("crontab", &[Process]),
    ("shutdown", &[Process]),
    ("reboot", &[Process]),
    // Block devices and filesystems.
    ("dd", &[Device]),
    ("mkfs", &[Device]),
    ("fdisk", &[Device]),
    ("parted", &[Device]),
    ("mount", &[Device]),
    ("umount", &[Device]),
    ("wipefs", &[Device]),
    ("mkswap", &[Device]),
    ("losetup", &[Device]),
    // Package managers install files and download them.
    ("npm", &[Write, Network]),
    ("yarn", &[Write, Network]),
    ("pnpm", &[Write, Network]),
    ("pip", &[Write, Network]),
    ("pip3", &[Write, Network]),
    ("pipx", &[Write, Network]),
    ("gem", &[Write, Network]),
    ("apt", &[Write, Network]),
    ("apt-get", &[Write, Network]),
    ("dnf", &[Write, Network]),
    ("yum", &[Write, Network]),
    ("apk", &[Write, Network]),
    ("pacman", &[Write, Network]),
    ("brew", &[Write, Network]),
    // Version control; refined per subcommand by `git_operations`.
    ("git", &[Read]),
];

/// git subcommands that never change the repository or work tree.
const GIT_READ_ONLY: &[&str] = &[
    "status", "log", "diff", "show", "blame", "grep", "ls-files", "ls-tree", "rev-parse",
    "describe", "shortlog", "reflog", "cat-file", "rev-list", "show-ref", "whatchanged", "help",
    "version",
];

/// git subcommands that only list things when called without mutating flags.
const GIT_LISTING: &[&str] = &["branch", "tag", "remote", "stash", "config", "worktree"];
const GIT_LISTING_ARGS: &[&str] = &["-a", "-v", "-vv", "-l", "-r", "--all", "--list", "list"];

const GIT_NETWORK: &[&str] = &["push", "pull", "fetch", "clone", "submodule"];
const GIT_DELETE: &[&str] = &["clean", "reset", "rm"];

/// git options that take a separate value before the subcommand.
const GIT_VALUE_OPTIONS: &[&str] = &["-C", "-c", "--git-dir", "--work-tree", "--namespace"];

static COMMAND_WORD: LazyLock<Regex> = LazyLock::new(|| {
    let mut names: Vec<&str> = COMMAND_TABLE.iter().map(|(name, _)| *name).collect();
    // Longest first so `apt-get` wins over `apt`.
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    let alternation = names
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?:^|[^\w./\-\[])({})(?:$|[^\w./\-\]])", alternation))
        .expect("invalid command word regex")
});

/// Operation classes for a command name, if it is in the table.
///
/// `mkfs.ext4`-style names resolve to their base tool.
pub fn operations_for(name: &str) -> Option<&'static [OperationClass]> {
    let base = match name.split_once('.') {
        Some((base, _)) if base == "mkfs" => base,
        _ => name,
    };
    COMMAND_TABLE
        .iter()
        .find(|(command, _)| *command == base)
        .map(|(_, ops)| *ops)
}

/// Every table command that appears as a standalone word anywhere in `text`,
/// except the names in `classified` (already handled structurally).
///
/// This catches commands the structural parser places in argument
/// position, e.g. inside quoted strings handed to another program.
pub fn scan_command_words(text: &str, classified: &[String]) -> BTreeSet<OperationClass> {
    let mut ops = BTreeSet::new();
    for line in text.lines() {
        // Matches consume their boundary character, so rescan from each
        // match start to catch adjacent words such as `ls ls`.
        let mut offset = 0;
        while let Some(captures) = COMMAND_WORD.captures_at(line, offset) {
            let Some(name) = captures.get(1) else { break };
            let already_classified = classified.iter().any(|c| c == name.as_str());
            if let Some(found) = operations_for(name.as_str()).filter(|_| !already_classified) {
                ops.extend(found.iter().copied());
            }
            offset = name.end();
        }
    }
    ops
}

/// Split git's arguments into the subcommand and the arguments after it.
pub fn git_subcommand(args: &[String]) -> Option<(&str, &[String])> {
    let mut i = 0;
    while let Some(arg) = args.get(i) {
        if GIT_VALUE_OPTIONS.contains(&arg.as_str()) {
            i += 2;
        } else if arg.starts_with('-') {
            i += 1;
        } else {
            return Some((arg.as_str(), &args[i + 1..]));
        }
    }
    None
}

/// Operation classes for a git invocation, refined by subcommand.
pub fn git_operations(args: &[String]) -> BTreeSet<OperationClass> {
    let Some((sub, rest)) = git_subcommand(args) else {
        // Bare `git` or `git --version`.
        return BTreeSet::from([Read]);
    };
    if GIT_READ_ONLY.contains(&sub) {
        return BTreeSet::from([Read]);
    }
    if GIT_LISTING.contains(&sub) && rest.iter().all(|a| GIT_LISTING_ARGS.contains(&a.as_str())) {
        return BTreeSet::from([Read]);
    }
    let mut ops = BTreeSet::from([Write]);
    if GIT_NETWORK.contains(&sub) {
        ops.insert(Network);
    }
    if GIT_DELETE.contains(&sub) {
        ops.insert(Delete);
    }
    ops
}
