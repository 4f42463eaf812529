//! Static reference prices.
//!
//! Used only for instruments no venue has ever quoted, so the
//! portfolio can still put a number on holdings before the first poll
//! lands.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub(crate) fn reference_price(symbol: &str) -> Option<Decimal> {
    let price = match symbol {
        "BTC" => dec!(93000),
        "ETH" => dec!(3100),
        "BNB" => dec!(620),
        "SOL" => dec!(245),
        "ADA" => dec!(0.95),
        "XRP" => dec!(1.10),
        _ => return None,
    };
    Some(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_prices() {
        assert_eq!(reference_price("BTC"), Some(dec!(93000)));
        assert_eq!(reference_price("XRP"), Some(dec!(1.10)));
        assert_eq!(reference_price("DOGE"), None);
    }
}
