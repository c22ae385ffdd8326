use serde::{Deserialize, Serialize};

/// Options of the ZDACS target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZdacsConfig {
    /// Script number of the synthesized initializer script.
    pub init_script_number: u32,
    /// Global array holding automatic storage and extra return words.
    pub loc_ars_array: u32,
    /// Global array and index of the "already initialized" flag.
    pub init_gbl_array: u32,
    pub init_gbl_index: u32,
    /// World array and index of the world initializer flag;
    /// `0xFFFF_FFFF` puts world initializers under the global flag.
    pub init_wld_array: u32,
    pub init_wld_index: u32,
    /// Write the string table as STRE instead of STRL.
    pub use_chunk_stre: bool,
    /// Prefix the chunks with a header older loaders accept.
    pub use_fake_acs0: bool,
}

impl ZdacsConfig {
    pub const NO_INDEX: u32 = 0xFFFF_FFFF;

    /// Whether world initializers have their own flag.
    pub fn has_wld_flag(&self) -> bool {
        self.init_wld_index != Self::NO_INDEX
    }
}

impl Default for ZdacsConfig {
    fn default() -> Self {
        Self {
            init_script_number: 999,
            loc_ars_array: 0,
            init_gbl_array: 0,
            init_gbl_index: 0,
            init_wld_array: Self::NO_INDEX,
            init_wld_index: Self::NO_INDEX,
            use_chunk_stre: false,
            use_fake_acs0: false,
        }
    }
}
