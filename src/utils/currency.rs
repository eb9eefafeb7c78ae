// utils/currency.rs
//
// Negotiation happens in whole rupees; storage and the gateway wire format
// are paise (1 rupee = 100 paise). Conversion happens in exactly one
// direction per boundary so no amount is ever multiplied twice.

pub fn rupees_to_paise(rupees: i64) -> i64 {
    rupees * 100
}

pub fn paise_to_rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rupee_conversion_is_exact() {
        assert_eq!(rupees_to_paise(1000), 100_000);
        assert_eq!(rupees_to_paise(1), 100);
    }

    #[test]
    fn paise_to_rupees_divides_by_hundred() {
        assert_eq!(paise_to_rupees(100_000), 1000.0);
        assert_eq!(paise_to_rupees(50), 0.50);
    }
}
