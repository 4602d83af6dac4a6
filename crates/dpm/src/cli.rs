//! Argument parsing. The ten names here are exactly `dpm_core::BUILTIN_COMMANDS`
//! (spec 4.D) — a component that defines a command under any of these
//! names fails assembly validation, since they're reserved for the
//! assistant itself.

use bpaf::Bpaf;

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options)]
pub struct DpmCli {
    #[bpaf(external(command))]
    pub command: Command,
}

#[derive(Debug, Clone, Bpaf)]
pub enum Command {
    /// Run the Deep Resolver over the current workspace and print (or
    /// write) the Resolution document.
    #[bpaf(command)]
    Resolve(#[bpaf(external(resolve_args))] ResolveArgs),

    /// Install an SDK version (a strict semver or a floating tag) and,
    /// if it is newer than what's linked, relink the assistant to it.
    #[bpaf(command)]
    Install(#[bpaf(external(install_args))] InstallArgs),

    /// Ensure the SDK version declared by the in-scope package
    /// descriptor is installed, installing it if missing.
    #[bpaf(command)]
    Bootstrap(#[bpaf(external(bootstrap_args))] BootstrapArgs),

    /// Re-resolve and install a floating reference (default: `latest`)
    /// for the active edition.
    #[bpaf(command)]
    Update(#[bpaf(external(update_args))] UpdateArgs),

    /// Remove a cached SDK manifest from `<home>/cache/sdk/<edition>`.
    #[bpaf(command)]
    Uninstall(#[bpaf(external(uninstall_args))] UninstallArgs),

    /// List every SDK version installed for the active edition.
    #[bpaf(command)]
    Versions,

    /// Print the version of the assistant binary currently linked at
    /// `<home>/bin`.
    #[bpaf(command)]
    Version,

    /// Operate on individual components directly, bypassing the
    /// Assembly Plan.
    #[bpaf(command)]
    Component(#[bpaf(external(component_command))] ComponentCommand),

    /// Inspect a registry repository's tags.
    #[bpaf(command)]
    Repo(#[bpaf(external(repo_command))] RepoCommand),

    /// Credential management is an external collaborator (spec 1); this
    /// prints where to configure one.
    #[bpaf(command)]
    Login,
}

#[derive(Debug, Clone, Bpaf)]
pub struct ResolveArgs {
    /// Emit JSON instead of YAML.
    #[bpaf(long)]
    pub json: bool,
    /// Write the document to this path instead of `DPM_RESOLUTION_FILE`
    /// or stdout. Created exclusively, as the env-var-driven path is
    /// (spec section 6).
    #[bpaf(long, argument("PATH"))]
    pub out: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Bpaf)]
pub struct InstallArgs {
    /// A strict semver or a floating tag (e.g. `latest`).
    #[bpaf(positional("REFERENCE"))]
    pub reference: String,
    /// `os/arch`, Go-style (e.g. `linux/amd64`); defaults to the host.
    #[bpaf(long, argument("OS/ARCH"))]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Bpaf)]
pub struct BootstrapArgs {
    #[bpaf(long, argument("OS/ARCH"))]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Bpaf)]
pub struct UpdateArgs {
    /// Defaults to `latest`.
    #[bpaf(positional("REFERENCE"))]
    pub reference: Option<String>,
    #[bpaf(long, argument("OS/ARCH"))]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Bpaf)]
pub struct UninstallArgs {
    #[bpaf(positional("VERSION"))]
    pub version: String,
}

#[derive(Debug, Clone, Bpaf)]
pub enum ComponentCommand {
    /// Pull a single named component directly, without an SDK manifest.
    #[bpaf(command)]
    Pull(#[bpaf(external(component_pull_args))] ComponentPullArgs),
    /// List every component materialized in the local cache.
    #[bpaf(command)]
    List,
}

#[derive(Debug, Clone, Bpaf)]
pub struct ComponentPullArgs {
    #[bpaf(positional("NAME"))]
    pub name: String,
    #[bpaf(positional("REFERENCE"))]
    pub reference: String,
    #[bpaf(long, argument("OS/ARCH"))]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Bpaf)]
pub enum RepoCommand {
    /// List every tag published under a repository.
    #[bpaf(command("list-tags"))]
    ListTags(#[bpaf(positional("REPO"))] String),
}
