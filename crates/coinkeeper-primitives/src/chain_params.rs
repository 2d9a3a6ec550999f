use bitcoin::Network;

/// Consensus parameters that drive how much rewind data has to be retained.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Network these parameters belong to.
    pub network: Network,
    /// Height of the last hardcoded checkpoint.
    ///
    /// Reorganizing below this height is not supported.
    pub last_checkpoint_height: u32,
    /// Maximum depth a chain may be rewound by consensus.
    ///
    /// `0` means the chain defines no formal bound, which is the case for the
    /// proof-of-work networks.
    pub max_reorg_length: u32,
}

impl ChainParams {
    /// Constructs a new instance of [`ChainParams`].
    // https://github.com/bitcoin/bitcoin/blob/v0.21.0/src/chainparams.cpp
    pub fn new(network: Network) -> Self {
        let last_checkpoint_height = match network {
            Network::Bitcoin => 295000, // 00000000000000004d9b4ef50f0f9d686fd69db2e03af35a100370c64632a983
            Network::Testnet => 546,    // 000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70
            _ => 0,
        };

        Self {
            network,
            last_checkpoint_height,
            max_reorg_length: 0,
        }
    }

    /// Overrides the maximum reorganization length.
    pub fn with_max_reorg_length(mut self, max_reorg_length: u32) -> Self {
        self.max_reorg_length = max_reorg_length;
        self
    }

    /// Overrides the height of the last checkpoint.
    pub fn with_last_checkpoint_height(mut self, height: u32) -> Self {
        self.last_checkpoint_height = height;
        self
    }

    /// Returns the maximum reorganization length if the chain defines one.
    pub fn max_reorg_length(&self) -> Option<u32> {
        (self.max_reorg_length > 0).then_some(self.max_reorg_length)
    }
}
