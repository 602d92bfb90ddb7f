//! Legacy (EIP-155) transaction encoding.

use rlp::RlpStream;

use chainctl_core::Result;

use super::keys::{EvmKey, keccak256};

/// Plain value transfers always cost this much gas.
pub const TRANSFER_GAS: u128 = 21_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: u128,
    pub gas_price: u128,
    pub gas: u128,
    /// `None` creates a contract.
    pub to: Option<[u8; 20]>,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTx {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&uint(self.nonce));
        stream.append(&uint(self.gas_price));
        stream.append(&uint(self.gas));
        stream.append(&self.to.map(|a| a.to_vec()).unwrap_or_default());
        stream.append(&uint(self.value));
        stream.append(&self.data);
    }

    /// Hash signed under EIP-155.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&uint(self.chain_id as u128));
        stream.append(&Vec::<u8>::new());
        stream.append(&Vec::<u8>::new());
        keccak256(&stream.out())
    }

    /// Signs and returns the raw transaction bytes.
    pub fn sign(&self, key: &EvmKey) -> Result<Vec<u8>> {
        let sig = key.sign_digest(&self.signing_hash())?;
        let v = self.chain_id as u128 * 2 + 35 + sig.recovery_id as u128;

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&uint(v));
        stream.append(&trim(&sig.r));
        stream.append(&trim(&sig.s));
        Ok(stream.out().to_vec())
    }
}

/// Address of a contract created by `sender` at `nonce`.
pub fn create_address(sender: &[u8; 20], nonce: u128) -> [u8; 20] {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.to_vec());
    stream.append(&uint(nonce));
    let hash = keccak256(&stream.out());
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Big-endian integer without leading zero bytes.
fn uint(value: u128) -> Vec<u8> {
    trim(&value.to_be_bytes())
}

fn trim(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Seed;
    use crate::evm::keys::{parse_address, to_checksum};

    fn eip155_example() -> LegacyTx {
        LegacyTx {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas: TRANSFER_GAS,
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn signing_hash_matches_eip155_example() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signed_tx_matches_eip155_example() {
        let key = EvmKey::from_seed(&Seed::from_hex(&"46".repeat(32)).unwrap()).unwrap();
        let raw = eip155_example().sign(&key).unwrap();
        assert_eq!(
            hex::encode(raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn uint_strips_leading_zeros() {
        assert_eq!(uint(0), Vec::<u8>::new());
        assert_eq!(uint(0x0400), vec![0x04, 0x00]);
    }

    #[test]
    fn create_address_matches_first_anvil_deployment() {
        let sender = parse_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        assert_eq!(
            to_checksum(&create_address(&sender, 0)),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
    }
}
