//! Contract bindings for the Tectonic money market.
//!
//! Tectonic is a Compound V2 fork: the core (comptroller) tracks account
//! liquidity and market membership, each tToken wraps one underlying asset.
//! State-changing tToken functions return a Compound error code instead of
//! reverting, so callers static-call them first and check for zero.

use alloy::sol;

sol! {
    /// Tectonic core (comptroller) interface.
    #[sol(rpc)]
    #[derive(Debug)]
    interface ITectonicCore {
        function getAccountLiquidity(address account) external view returns (uint256, uint256, uint256);
        function getAssetsIn(address account) external view returns (address[] memory);
        function enterMarkets(address[] calldata tTokens) external returns (uint256[] memory);
        function markets(address tToken) external view returns (bool isListed, uint256 collateralFactorMantissa, bool isComped);
        function oracle() external view returns (address);
    }

    /// tToken interface (CErc20 subset).
    #[sol(rpc)]
    #[derive(Debug)]
    interface ITToken {
        function mint(uint256 mintAmount) external returns (uint256);
        function redeem(uint256 redeemTokens) external returns (uint256);
        function redeemUnderlying(uint256 redeemAmount) external returns (uint256);
        function borrow(uint256 borrowAmount) external returns (uint256);
        function repayBorrow(uint256 repayAmount) external returns (uint256);
        function borrowBalanceCurrent(address account) external returns (uint256);
        function exchangeRateStored() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function underlying() external view returns (address);
        function comptroller() external view returns (address);
        function tectonicCore() external view returns (address);
    }

    /// ERC-20 subset used for approvals and balances.
    #[sol(rpc)]
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }

    /// Price oracle used by the core, priced in `1e(36 - underlying decimals)`.
    #[sol(rpc)]
    #[derive(Debug)]
    interface ITectonicOracle {
        function getUnderlyingPrice(address tToken) external view returns (uint256);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::SolCall;

    #[test]
    fn test_core_selectors() {
        assert_eq!(
            hex::encode(ITectonicCore::getAccountLiquidityCall::SELECTOR),
            "5ec88c79"
        );
        assert_eq!(
            hex::encode(ITectonicCore::enterMarketsCall::SELECTOR),
            "c2998238"
        );
    }

    #[test]
    fn test_ttoken_selectors() {
        assert_eq!(hex::encode(ITToken::mintCall::SELECTOR), "a0712d68");
        assert_eq!(hex::encode(ITToken::borrowCall::SELECTOR), "c5ebeaec");
        assert_eq!(hex::encode(ITToken::repayBorrowCall::SELECTOR), "0e752702");
        assert_eq!(
            hex::encode(ITToken::redeemUnderlyingCall::SELECTOR),
            "852a12e3"
        );
        assert_eq!(
            hex::encode(ITToken::exchangeRateStoredCall::SELECTOR),
            "182df0f5"
        );
    }

    #[test]
    fn test_repay_all_encoding() {
        let call = ITToken::repayBorrowCall {
            repayAmount: U256::MAX,
        };
        let encoded = call.abi_encode();
        assert_eq!(encoded.len(), 4 + 32);
        assert!(encoded[4..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn test_enter_markets_encoding() {
        let market = Address::repeat_byte(0x11);
        let encoded = ITectonicCore::enterMarketsCall {
            tTokens: vec![market],
        }
        .abi_encode();
        // selector + offset + length + one address word
        assert_eq!(encoded.len(), 4 + 32 * 3);
    }
}
