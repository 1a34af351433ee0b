#![no_main]

use libfuzzer_sys::fuzz_target;
use tinyrpc::core::header::{Header, RequestHeader, ResponseHeader};

fuzz_target!(|data: &[u8]| {
    // Decoding never panics; whatever decodes survives a re-encode unchanged
    let mut request = RequestHeader::default();
    if request.unmarshal(data).is_ok() {
        let mut again = RequestHeader::default();
        again.unmarshal(&request.marshal()).unwrap();
        assert_eq!(again, request);
    }

    let mut response = ResponseHeader::default();
    if response.unmarshal(data).is_ok() {
        let mut again = ResponseHeader::default();
        again.unmarshal(&response.marshal()).unwrap();
        assert_eq!(again, response);
    }
});
