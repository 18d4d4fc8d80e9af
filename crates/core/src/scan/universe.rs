use crate::domain::classification::Exchange;
use std::collections::BTreeSet;

// Static universe of major listed symbols per exchange, roughly the top of
// each board by market cap. The raw lists contain a few repeats; enumeration
// dedupes preserving first occurrence so scan order stays deterministic.
const HOSE_SYMBOLS: &[&str] = &[
    "VCB", "VHM", "VIC", "VNM", "HPG", "TCB", "MSN", "MBB", "FPT", "VPB",
    "VRE", "CTG", "BID", "GAS", "PLX", "POW", "SSI", "MWG", "SAB", "HDB",
    "STB", "VJC", "ACB", "GVR", "TPB", "PDR", "REE", "VCG", "NVL", "DGC",
    "BCM", "KDH", "VHC", "VCI", "HCM", "DIG", "VGC", "CTD", "VIB", "PNJ",
    "DCM", "DXG", "GMD", "HT1", "KBC", "MBB", "NT2", "PVD", "SBT", "VPI",
    "BVH", "CII", "DPM", "FCN", "HAG", "HNG", "HSG", "ITA", "KDC", "LGC",
    "NLG", "PC1", "PPC", "PVT", "SCS", "SHB", "SSB", "VCS", "VGS", "VHG",
    "DHG", "DPR", "DRC", "DVP", "EIB", "EVF", "GEG", "GMD", "HCM", "HDC",
    "HHS", "HQC", "HT1", "IDC", "IJC", "KBC", "KDC", "KDH", "LCG", "LDG",
    "LPB", "MBB", "MSB", "NAF", "NBB", "NHA", "NT2", "NVT", "OCB", "PDN",
];

const HNX_SYMBOLS: &[&str] = &[
    "PVS", "CEO", "SHS", "PVI", "HUT", "VCG", "PVX", "DBC", "TNG", "PLC",
    "NRC", "VIG", "BAB", "NDN", "PVB", "DXP", "TIG", "VGP", "PVG", "HHC",
    "DTD", "VCS", "SLS", "VC3", "PVE", "L14", "LIG", "DTT", "DQC", "AMC",
];

fn symbols_for(exchange: Exchange) -> &'static [&'static str] {
    match exchange {
        Exchange::Hose => HOSE_SYMBOLS,
        Exchange::Hnx => HNX_SYMBOLS,
    }
}

/// Enumerates the symbol universe for the requested exchanges, in list
/// order, with duplicates removed (first listing wins, so a dual-listed
/// symbol is tagged with the first requested exchange that carries it).
pub fn universe(exchanges: &[Exchange]) -> Vec<(&'static str, Exchange)> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for &exchange in exchanges {
        for &symbol in symbols_for(exchange) {
            if seen.insert(symbol) {
                out.push((symbol, exchange));
            }
        }
    }
    out
}

/// Best-effort exchange tag for a symbol outside a full enumeration (used
/// when refreshing cache entries). HOSE takes precedence for dual listings,
/// matching `universe` ordering; unknown symbols default to HOSE.
pub fn exchange_for_symbol(symbol: &str) -> Exchange {
    let s = symbol.trim().to_ascii_uppercase();
    if HOSE_SYMBOLS.contains(&s.as_str()) {
        Exchange::Hose
    } else if HNX_SYMBOLS.contains(&s.as_str()) {
        Exchange::Hnx
    } else {
        Exchange::Hose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_has_no_duplicates() {
        let all = universe(&[Exchange::Hose, Exchange::Hnx]);
        let unique: BTreeSet<&str> = all.iter().map(|(s, _)| *s).collect();
        assert_eq!(unique.len(), all.len());
        assert!(all.len() >= 100);
    }

    #[test]
    fn dual_listed_symbol_tags_first_requested_exchange() {
        // VCG appears on both boards; with HOSE requested first it is HOSE.
        let all = universe(&[Exchange::Hose, Exchange::Hnx]);
        let vcg = all.iter().find(|(s, _)| *s == "VCG").unwrap();
        assert_eq!(vcg.1, Exchange::Hose);

        let hnx_only = universe(&[Exchange::Hnx]);
        let vcg = hnx_only.iter().find(|(s, _)| *s == "VCG").unwrap();
        assert_eq!(vcg.1, Exchange::Hnx);
    }

    #[test]
    fn enumeration_order_is_stable() {
        let a = universe(&[Exchange::Hose]);
        let b = universe(&[Exchange::Hose]);
        assert_eq!(a, b);
        assert_eq!(a[0].0, "VCB");
    }

    #[test]
    fn exchange_lookup_prefers_hose_and_defaults_to_hose() {
        assert_eq!(exchange_for_symbol("PVS"), Exchange::Hnx);
        assert_eq!(exchange_for_symbol("vcb"), Exchange::Hose);
        assert_eq!(exchange_for_symbol("VCG"), Exchange::Hose);
        assert_eq!(exchange_for_symbol("ZZZ"), Exchange::Hose);
    }
}
