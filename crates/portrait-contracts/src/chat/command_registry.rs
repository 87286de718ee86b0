#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const PROMPT_COMMAND: CommandSpec = CommandSpec {
    command: "prompt",
    action: "set_prompt",
};

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const INDEX_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "select",
        action: "select_from_gallery",
    },
    CommandSpec {
        command: "delete",
        action: "delete_from_gallery",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "new",
        action: "new_character",
    },
    CommandSpec {
        command: "undo",
        action: "undo",
    },
    CommandSpec {
        command: "save",
        action: "save_to_gallery",
    },
    CommandSpec {
        command: "gallery",
        action: "list_gallery",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/generate",
    "/prompt <text>",
    "/upload <path>",
    "/new",
    "/undo",
    "/save",
    "/gallery",
    "/select <n>",
    "/delete <n>",
    "/download <path>",
    "/status",
    "/help",
    "/quit",
];
