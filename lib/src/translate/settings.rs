use super::{BlockId, Error};

/// Naming conventions shared between the generated code and the runtime it links against
pub struct Settings {
    /// Headers included at the top of the generated unit (in order)
    pub includes: Vec<String>,

    /// Macro that must be defined for the runtime to be built in compiled-code mode
    ///
    /// The generated unit refuses to compile without it.
    pub compiled_mode_macro: Option<String>,

    /// Namespace of the runtime (eg. `lobster`)
    pub runtime_namespace: String,

    /// Type of the runtime state object passed into every block (eg. `VM`)
    pub context_type: String,

    /// Name of the runtime state parameter of every block (eg. `vm`)
    pub context_param: String,

    /// Type of a pointer to a block function, as defined by the runtime (eg. `block_t`)
    pub block_type: String,

    /// Block function name prefix (eg. `block`), followed by the block's offset
    pub block_prefix: String,

    /// Opcode handler method prefix (eg. `F_`), followed by the opcode's name
    pub handler_prefix: String,

    /// Runtime slot holding the next block to run
    pub next_call_target_slot: String,

    /// Runtime slot holding the block table of the next multi-dispatch
    pub next_mm_table_slot: String,

    /// Name of the built-in function that resumes a coroutine
    pub resume_builtin: String,

    /// Name of the static array holding the embedded bytecode
    pub bytecode_table_name: String,

    /// Runtime function taking `(argc, argv, start_block, bytecode)` and running the program
    pub bootstrap_function: String,

    /// Words of embedded bytecode on each line (at least one)
    pub words_per_line: usize,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            includes: vec![
                String::from("stdafx.h"),
                String::from("vmdata.h"),
                String::from("compiled_code.h"),
            ],
            compiled_mode_macro: Some(String::from("VM_COMPILED_CODE_MODE")),
            runtime_namespace: String::from("lobster"),
            context_type: String::from("VM"),
            context_param: String::from("vm"),
            block_type: String::from("block_t"),
            block_prefix: String::from("block"),
            handler_prefix: String::from("F_"),
            next_call_target_slot: String::from("next_call_target"),
            next_mm_table_slot: String::from("next_mm_table"),
            resume_builtin: String::from("resume"),
            bytecode_table_name: String::from("bytecodefb"),
            bootstrap_function: String::from("EngineRunCompiledCodeMain"),
            words_per_line: 16,
        }
    }

    /// Switch to a different runtime namespace (eg. `my::runtime`)
    pub fn set_runtime_namespace(&mut self, namespace: &str) -> Result<(), Error> {
        if !namespace.split("::").all(is_identifier) {
            return Err(Error::InvalidIdentifier(namespace.to_owned()));
        }
        self.runtime_namespace = namespace.to_owned();
        Ok(())
    }

    /// Fully qualified type of the runtime state (eg. `lobster::VM`)
    pub fn qualified_context_type(&self) -> String {
        format!("{}::{}", self.runtime_namespace, self.context_type)
    }

    /// Fully qualified block pointer type (eg. `lobster::block_t`)
    pub fn qualified_block_type(&self) -> String {
        format!("{}::{}", self.runtime_namespace, self.block_type)
    }

    /// Name of the function implementing a block (eg. `block12`)
    pub fn block_name(&self, block: BlockId) -> String {
        format!("{}{}", self.block_prefix, block.0)
    }

    /// Check that every setting used as an identifier is one
    pub fn validate(&self) -> Result<(), Error> {
        if !self.runtime_namespace.split("::").all(is_identifier) {
            return Err(Error::InvalidIdentifier(self.runtime_namespace.clone()));
        }
        let identifiers = [
            &self.context_type,
            &self.context_param,
            &self.block_type,
            &self.block_prefix,
            &self.handler_prefix,
            &self.next_call_target_slot,
            &self.next_mm_table_slot,
            &self.bytecode_table_name,
            &self.bootstrap_function,
        ];
        match identifiers.into_iter().find(|name| !is_identifier(name)) {
            Some(name) => Err(Error::InvalidIdentifier(name.clone())),
            None => Ok(()),
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

/// Is this a valid C++ identifier (ASCII only)?
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::new();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.qualified_context_type(), "lobster::VM");
        assert_eq!(settings.qualified_block_type(), "lobster::block_t");
        assert_eq!(settings.block_name(BlockId(12)), "block12");
    }

    #[test]
    fn namespaces() {
        let mut settings = Settings::new();
        assert!(settings.set_runtime_namespace("my::rt").is_ok());
        assert_eq!(settings.qualified_context_type(), "my::rt::VM");
        assert!(matches!(
            settings.set_runtime_namespace("my::"),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(matches!(
            settings.set_runtime_namespace("1abc"),
            Err(Error::InvalidIdentifier(_))
        ));
        assert_eq!(settings.runtime_namespace, "my::rt");
    }

    #[test]
    fn bad_identifier() {
        let mut settings = Settings::new();
        settings.block_prefix = String::from("block-");
        assert!(matches!(
            settings.validate(),
            Err(Error::InvalidIdentifier(name)) if name == "block-"
        ));
    }
}
